//! Timer-driven sampling of process-level signals.

use crate::alerts::AlertLog;
use crate::sampler::ProcessSampler;
use crate::task::PeriodicTask;
use crate::timeseries::TimeSeriesStore;
use crate::types::{Alert, Labels, Severity, labels};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

pub const PROCESS_MEMORY_BYTES: &str = "process_memory_bytes";
pub const PROCESS_CPU_MICROSECONDS: &str = "process_cpu_microseconds";
pub const PROCESS_MEMORY_USAGE_PERCENT: &str = "process_memory_usage_percent";
pub const EVENT_LOOP_LAG_MS: &str = "event_loop_lag_ms";

/// Collector thresholds and cadence
#[derive(Debug, Clone, Copy)]
pub struct CollectorConfig {
    pub interval: Duration,
    /// heap_used / heap_total above which a high alert is raised
    pub memory_alert_ratio: f64,
    /// Scheduler lag above which a medium alert is raised
    pub lag_alert_threshold: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            memory_alert_ratio: 0.9,
            lag_alert_threshold: Duration::from_millis(100),
        }
    }
}

/// Periodic process sampler feeding the store and alert log
pub struct PeriodicCollector {
    store: Arc<TimeSeriesStore>,
    alerts: Arc<AlertLog>,
    sampler: Arc<dyn ProcessSampler>,
    config: CollectorConfig,
}

impl PeriodicCollector {
    pub fn new(
        store: Arc<TimeSeriesStore>,
        alerts: Arc<AlertLog>,
        sampler: Arc<dyn ProcessSampler>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            store,
            alerts,
            sampler,
            config,
        }
    }

    /// Record memory and CPU figures. Returns the alert raised, if any.
    pub async fn collect_system_metrics(&self) -> Option<Alert> {
        let memory = self.sampler.memory();
        for (kind, value) in [
            ("rss", memory.rss),
            ("heap_used", memory.heap_used),
            ("heap_total", memory.heap_total),
            ("external", memory.external),
        ] {
            self.store
                .record(PROCESS_MEMORY_BYTES, value as f64, &labels([("type", kind)]));
        }

        let cpu = self.sampler.cpu();
        self.store
            .record(PROCESS_CPU_MICROSECONDS, cpu.user as f64, &labels([("type", "user")]));
        self.store.record(
            PROCESS_CPU_MICROSECONDS,
            cpu.system as f64,
            &labels([("type", "system")]),
        );

        let ratio = memory.heap_ratio();
        self.store
            .record(PROCESS_MEMORY_USAGE_PERCENT, ratio * 100.0, &Labels::new());

        if ratio > self.config.memory_alert_ratio {
            warn!(usage_percent = ratio * 100.0, "Memory usage above threshold");
            let alert = self
                .alerts
                .create(
                    format!("High memory usage: {:.1}%", ratio * 100.0),
                    Severity::High,
                )
                .await;
            return Some(alert);
        }

        None
    }

    /// Sample scheduler lag: the delay between spawning a task and its first poll
    pub async fn measure_event_loop_lag(&self) -> Duration {
        let scheduled = Instant::now();
        match tokio::spawn(async move { scheduled.elapsed() }).await {
            Ok(lag) => lag,
            Err(e) => {
                debug!(error = %e, "Lag probe task did not run");
                Duration::ZERO
            }
        }
    }

    /// Record a lag sample. Returns the alert raised, if any.
    pub async fn record_event_loop_lag(&self, lag: Duration) -> Option<Alert> {
        let lag_ms = lag.as_secs_f64() * 1000.0;
        self.store.record(EVENT_LOOP_LAG_MS, lag_ms, &Labels::new());

        if lag > self.config.lag_alert_threshold {
            warn!(lag_ms, "Event loop lag above threshold");
            let alert = self
                .alerts
                .create(format!("High event loop lag: {:.0}ms", lag_ms), Severity::Medium)
                .await;
            return Some(alert);
        }

        None
    }

    /// One full collection pass
    pub async fn collect_once(&self) {
        self.collect_system_metrics().await;
        let lag = self.measure_event_loop_lag().await;
        self.record_event_loop_lag(lag).await;
    }

    /// Run collection passes on the configured interval
    pub fn start(self: &Arc<Self>) -> PeriodicTask {
        let collector = Arc::clone(self);
        PeriodicTask::spawn("process-collector", self.config.interval, move || {
            let collector = collector.clone();
            async move {
                collector.collect_once().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{CpuUsage, MemoryUsage};

    struct FixedSampler {
        heap_used: u64,
        heap_total: u64,
    }

    impl ProcessSampler for FixedSampler {
        fn memory(&self) -> MemoryUsage {
            MemoryUsage {
                rss: self.heap_used,
                heap_used: self.heap_used,
                heap_total: self.heap_total,
                external: 0,
            }
        }

        fn cpu(&self) -> CpuUsage {
            CpuUsage {
                user: 1500,
                system: 700,
            }
        }
    }

    fn collector(heap_used: u64, heap_total: u64) -> (PeriodicCollector, Arc<TimeSeriesStore>, Arc<AlertLog>) {
        let store = Arc::new(TimeSeriesStore::default());
        let alerts = Arc::new(AlertLog::default());
        let collector = PeriodicCollector::new(
            store.clone(),
            alerts.clone(),
            Arc::new(FixedSampler {
                heap_used,
                heap_total,
            }),
            CollectorConfig::default(),
        );
        (collector, store, alerts)
    }

    #[tokio::test]
    async fn test_high_memory_ratio_raises_high_alert() {
        let (collector, _, alerts) = collector(95, 100);
        let alert = collector.collect_system_metrics().await.expect("alert");
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alerts.len().await, 1);
    }

    #[tokio::test]
    async fn test_normal_memory_ratio_raises_nothing() {
        let (collector, _, alerts) = collector(50, 100);
        assert!(collector.collect_system_metrics().await.is_none());
        assert!(alerts.is_empty().await);
    }

    #[tokio::test]
    async fn test_system_metrics_are_tagged_by_type() {
        let (collector, store, _) = collector(50, 100);
        collector.collect_system_metrics().await;

        let memory = store.latest(Some(PROCESS_MEMORY_BYTES));
        let kinds: Vec<&str> = memory
            .iter()
            .map(|m| m.labels.get("type").unwrap().as_str())
            .collect();
        assert_eq!(kinds, vec!["external", "heap_total", "heap_used", "rss"]);

        let user = store.samples(PROCESS_CPU_MICROSECONDS, &labels([("type", "user")]));
        assert_eq!(user[0].value, 1500.0);
        let percent = store.samples(PROCESS_MEMORY_USAGE_PERCENT, &Labels::new());
        assert_eq!(percent[0].value, 50.0);
    }

    #[tokio::test]
    async fn test_lag_threshold() {
        let (collector, store, alerts) = collector(1, 100);

        assert!(collector.record_event_loop_lag(Duration::from_millis(5)).await.is_none());
        let alert = collector
            .record_event_loop_lag(Duration::from_millis(250))
            .await
            .expect("alert");
        assert_eq!(alert.severity, Severity::Medium);
        assert!(alert.message.contains("250"));
        assert_eq!(alerts.len().await, 1);
        assert_eq!(store.query(EVENT_LOOP_LAG_MS, &Labels::new(), None).count, 2);
    }

    #[tokio::test]
    async fn test_measured_lag_is_small_on_idle_runtime() {
        let (collector, _, _) = collector(1, 100);
        let lag = collector.measure_event_loop_lag().await;
        assert!(lag < Duration::from_secs(1));
    }
}
