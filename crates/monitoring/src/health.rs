//! Registry of named asynchronous health probes.

use crate::types::{HealthCheckResult, HealthStatus};
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

/// Error type probes may return
pub type ProbeError = Box<dyn std::error::Error + Send + Sync>;

/// Outcome of a probe invocation
pub type ProbeResult = Result<ProbeReport, ProbeError>;

/// What a probe reports about its dependency
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: HealthStatus,
    pub error: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ProbeReport {
    /// Create a healthy report
    pub fn healthy() -> Self {
        Self {
            status: HealthStatus::Healthy,
            error: None,
            metadata: None,
        }
    }

    /// Create a degraded report
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            error: Some(message.into()),
            metadata: None,
        }
    }

    /// Create an unhealthy report
    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            error: Some(message.into()),
            metadata: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata
            .get_or_insert_with(serde_json::Map::new)
            .insert(key.to_string(), value.into());
        self
    }
}

/// Health probe trait
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Check the dependency
    async fn check(&self) -> ProbeResult;
}

/// Adapts an async closure into a probe
pub struct FnProbe<F>(F);

impl<F> FnProbe<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> HealthProbe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProbeResult> + Send + 'static,
{
    async fn check(&self) -> ProbeResult {
        (self.0)().await
    }
}

/// How `run_all` schedules probes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// One after another in registration order, no timeout
    #[default]
    Sequential,
    /// All at once, each bounded by `timeout`
    Concurrent { timeout: Duration },
}

/// Named probes executed on demand
pub struct HealthCheckRegistry {
    probes: RwLock<Vec<(String, Arc<dyn HealthProbe>)>>,
    mode: ExecutionMode,
}

impl HealthCheckRegistry {
    /// Create an empty registry running probes sequentially
    pub fn new() -> Self {
        Self::with_mode(ExecutionMode::Sequential)
    }

    /// Create an empty registry with an explicit execution mode
    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self {
            probes: RwLock::new(Vec::new()),
            mode,
        }
    }

    /// Execution mode
    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// Register a probe. A probe already registered under `name` is replaced
    /// and keeps its position.
    pub async fn register(&self, name: impl Into<String>, probe: Arc<dyn HealthProbe>) {
        let name = name.into();
        let mut probes = self.probes.write().await;
        match probes.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => {
                debug!(probe = %name, "Replacing health probe");
                slot.1 = probe;
            }
            None => {
                debug!(probe = %name, "Registering health probe");
                probes.push((name, probe));
            }
        }
    }

    /// Register an async closure as a probe
    pub async fn register_fn<F, Fut>(&self, name: impl Into<String>, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProbeResult> + Send + 'static,
    {
        self.register(name, Arc::new(FnProbe::new(f))).await;
    }

    /// Remove a probe. Returns false when no probe had that name.
    pub async fn unregister(&self, name: &str) -> bool {
        let mut probes = self.probes.write().await;
        let before = probes.len();
        probes.retain(|(n, _)| n != name);
        probes.len() != before
    }

    /// Registered probe names in registration order
    pub async fn names(&self) -> Vec<String> {
        self.probes
            .read()
            .await
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Run every registered probe and collect results by name
    pub async fn run_all(&self) -> BTreeMap<String, HealthCheckResult> {
        // Snapshot so registration is never blocked behind a slow probe
        let probes: Vec<(String, Arc<dyn HealthProbe>)> = self.probes.read().await.clone();

        let results = match self.mode {
            ExecutionMode::Sequential => {
                let mut results = Vec::with_capacity(probes.len());
                for (name, probe) in &probes {
                    results.push(run_probe(name, probe.as_ref()).await);
                }
                results
            }
            ExecutionMode::Concurrent { timeout: limit } => {
                join_all(probes.iter().map(|(name, probe)| async move {
                    match timeout(limit, run_probe(name, probe.as_ref())).await {
                        Ok(result) => result,
                        Err(_) => {
                            warn!(probe = %name, timeout_ms = limit.as_millis(), "Health probe timed out");
                            HealthCheckResult {
                                name: name.clone(),
                                status: HealthStatus::Unhealthy,
                                latency_ms: Some(limit.as_secs_f64() * 1000.0),
                                error: Some(format!("Health check timed out after {}ms", limit.as_millis())),
                                metadata: None,
                            }
                        }
                    }
                }))
                .await
            }
        };

        results.into_iter().map(|r| (r.name.clone(), r)).collect()
    }
}

impl Default for HealthCheckRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Worst status across a set of results. Healthy when empty.
pub fn overall_status<'a, I>(results: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a HealthCheckResult>,
{
    results
        .into_iter()
        .fold(HealthStatus::Healthy, |acc, r| match (acc, r.status) {
            (HealthStatus::Unhealthy, _) | (_, HealthStatus::Unhealthy) => HealthStatus::Unhealthy,
            (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
            _ => HealthStatus::Healthy,
        })
}

async fn run_probe(name: &str, probe: &dyn HealthProbe) -> HealthCheckResult {
    let start = Instant::now();
    let outcome = AssertUnwindSafe(probe.check()).catch_unwind().await;
    let latency_ms = Some(start.elapsed().as_secs_f64() * 1000.0);

    match outcome {
        Ok(Ok(report)) => {
            debug!(probe = %name, status = %report.status, latency_ms, "Health probe finished");
            HealthCheckResult {
                name: name.to_string(),
                status: report.status,
                latency_ms,
                error: report.error,
                metadata: report.metadata,
            }
        }
        Ok(Err(e)) => {
            warn!(probe = %name, error = %e, "Health probe failed");
            HealthCheckResult {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some(e.to_string()),
                metadata: None,
            }
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            warn!(probe = %name, error = %message, "Health probe panicked");
            HealthCheckResult {
                name: name.to_string(),
                status: HealthStatus::Unhealthy,
                latency_ms,
                error: Some(format!("probe panicked: {}", message)),
                metadata: None,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
