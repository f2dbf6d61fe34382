//! In-process observability for backend services.
//!
//! This crate records and inspects the runtime health of a service:
//! - Bounded time-series store with label-aware aggregation
//! - Registry of async health probes with per-probe isolation
//! - Bounded alert log with severity routing
//! - Per-request instrumentation with slow-request and 5xx alerts
//! - Periodic process sampler (memory, CPU, scheduler lag)
//! - Prometheus text export and a dashboard snapshot
//!
//! # Example
//!
//! ```no_run
//! use monitoring::{AlertLog, Dashboard, RequestDescriptor, RequestInstrumentation, TimeSeriesStore};
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let store = Arc::new(TimeSeriesStore::default());
//! let alerts = Arc::new(AlertLog::default());
//! let instrumentation = RequestInstrumentation::new(store.clone(), alerts.clone());
//!
//! let timer = instrumentation.start(RequestDescriptor::new("GET", "/users/:id"));
//! instrumentation.finish(timer, 200);
//!
//! let snapshot = Dashboard::new(store, alerts).snapshot().await;
//! println!("{} requests in the last hour", snapshot.requests.count);
//! # }
//! ```

pub mod alerts;
pub mod collector;
pub mod dashboard;
pub mod export;
pub mod health;
pub mod instrumentation;
pub mod probes;
pub mod sampler;
pub mod task;
pub mod timeseries;
pub mod types;

pub use alerts::{AlertLog, AlertLogConfig, AlertSink, TracingSink};
pub use collector::{CollectorConfig, PeriodicCollector};
pub use dashboard::{Dashboard, DashboardSnapshot};
pub use export::export_prometheus;
pub use health::{
    ExecutionMode, HealthCheckRegistry, HealthProbe, ProbeError, ProbeReport, ProbeResult,
    overall_status,
};
pub use instrumentation::{RequestDescriptor, RequestInstrumentation, RequestTimer};
pub use probes::{HttpProbe, MemoryProbe, TcpProbe};
pub use reqwest::Method as HttpMethod;
pub use sampler::{CpuUsage, MemoryUsage, ProcessSampler, SystemSampler};
pub use task::PeriodicTask;
pub use timeseries::{DEFAULT_MAX_SERIES, TimeSeriesConfig, TimeSeriesStore};
pub use types::{
    Alert, HealthCheckResult, HealthStatus, Labels, MetricStats, Sample, Severity, TimeRange,
    labels,
};
