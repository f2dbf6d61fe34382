//! Prometheus counters for the cache layer.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

/// Labels for backend operation counters
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OperationLabels {
    /// Operation (get, set, del, ...)
    pub operation: String,
    /// Outcome (hit, miss, ok, error)
    pub outcome: String,
}

/// Labels for rate limiter decisions
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct DecisionLabels {
    /// Decision (allowed, rejected, failed_open)
    pub decision: String,
}

/// Labels for cache-aside lookups
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct LookupLabels {
    /// Outcome (hit, miss, compute_error)
    pub outcome: String,
}

/// Registry holding every cache-layer counter
pub struct CacheMetrics {
    registry: Registry,
    operations_total: Family<OperationLabels, Counter>,
    rate_limit_decisions_total: Family<DecisionLabels, Counter>,
    cache_aside_total: Family<LookupLabels, Counter>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let operations_total = Family::<OperationLabels, Counter>::default();
        registry.register(
            "cache_operations",
            "Cache backend operations by outcome",
            operations_total.clone(),
        );

        let rate_limit_decisions_total = Family::<DecisionLabels, Counter>::default();
        registry.register(
            "cache_rate_limit_decisions",
            "Rate limiter decisions",
            rate_limit_decisions_total.clone(),
        );

        let cache_aside_total = Family::<LookupLabels, Counter>::default();
        registry.register(
            "cache_aside_lookups",
            "Cache-aside lookups by outcome",
            cache_aside_total.clone(),
        );

        Self {
            registry,
            operations_total,
            rate_limit_decisions_total,
            cache_aside_total,
        }
    }

    pub fn record_operation(&self, operation: &str, outcome: &str) {
        self.operations_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn record_decision(&self, decision: &str) {
        self.rate_limit_decisions_total
            .get_or_create(&DecisionLabels {
                decision: decision.to_string(),
            })
            .inc();
    }

    pub fn record_lookup(&self, outcome: &str) {
        self.cache_aside_total
            .get_or_create(&LookupLabels {
                outcome: outcome.to_string(),
            })
            .inc();
    }

    pub fn operation_count(&self, operation: &str, outcome: &str) -> u64 {
        self.operations_total
            .get_or_create(&OperationLabels {
                operation: operation.to_string(),
                outcome: outcome.to_string(),
            })
            .get()
    }

    /// Encode in OpenMetrics text format
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}
