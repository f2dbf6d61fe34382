//! Per-request metrics and threshold alerts.

use crate::alerts::AlertLog;
use crate::timeseries::TimeSeriesStore;
use crate::types::{Alert, Labels, Severity, labels};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_MS: &str = "http_request_duration_ms";
pub const HTTP_RESPONSES_TOTAL: &str = "http_responses_total";

/// Default duration above which a request is reported as slow
pub const DEFAULT_SLOW_REQUEST_THRESHOLD: Duration = Duration::from_millis(5000);

/// Method and route of an inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub method: String,
    /// Matched route template, or the raw path when no route matched
    pub path: String,
}

impl RequestDescriptor {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
        }
    }

    fn labels(&self) -> Labels {
        labels([("method", self.method.as_str()), ("path", self.path.as_str())])
    }

    fn labels_with_status(&self, status: u16) -> Labels {
        let mut labels = self.labels();
        labels.insert("status_code".to_string(), status.to_string());
        labels
    }
}

/// In-flight request returned by [`RequestInstrumentation::start`]
#[derive(Debug)]
pub struct RequestTimer {
    descriptor: RequestDescriptor,
    started: Instant,
}

impl RequestTimer {
    pub fn descriptor(&self) -> &RequestDescriptor {
        &self.descriptor
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Records request counters and latencies and raises alerts on slow or
/// failing requests
pub struct RequestInstrumentation {
    store: Arc<TimeSeriesStore>,
    alerts: Arc<AlertLog>,
    slow_threshold: Duration,
}

impl RequestInstrumentation {
    pub fn new(store: Arc<TimeSeriesStore>, alerts: Arc<AlertLog>) -> Self {
        Self::with_slow_threshold(store, alerts, DEFAULT_SLOW_REQUEST_THRESHOLD)
    }

    pub fn with_slow_threshold(
        store: Arc<TimeSeriesStore>,
        alerts: Arc<AlertLog>,
        slow_threshold: Duration,
    ) -> Self {
        Self {
            store,
            alerts,
            slow_threshold,
        }
    }

    /// Count the request and start its timer
    pub fn start(&self, descriptor: RequestDescriptor) -> RequestTimer {
        self.store
            .record(HTTP_REQUESTS_TOTAL, 1.0, &descriptor.labels());
        RequestTimer {
            descriptor,
            started: Instant::now(),
        }
    }

    /// Record the response. Alerts are created on a spawned task so the
    /// response is never held up by them.
    pub fn finish(&self, timer: RequestTimer, status: u16) {
        let duration = timer.started.elapsed();
        let pending = self.record_response(&timer.descriptor, status, duration);
        if pending.is_empty() {
            return;
        }

        let alerts = Arc::clone(&self.alerts);
        tokio::spawn(async move {
            for (message, severity) in pending {
                alerts.create(message, severity).await;
            }
        });
    }

    /// Record a completed request and wait for the alerts it raised
    pub async fn record_completion(
        &self,
        descriptor: &RequestDescriptor,
        status: u16,
        duration: Duration,
    ) -> Vec<Alert> {
        let pending = self.record_response(descriptor, status, duration);
        let mut raised = Vec::with_capacity(pending.len());
        for (message, severity) in pending {
            raised.push(self.alerts.create(message, severity).await);
        }
        raised
    }

    fn record_response(
        &self,
        descriptor: &RequestDescriptor,
        status: u16,
        duration: Duration,
    ) -> Vec<(String, Severity)> {
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let labels = descriptor.labels_with_status(status);
        self.store
            .record(HTTP_REQUEST_DURATION_MS, duration_ms, &labels);
        self.store.record(HTTP_RESPONSES_TOTAL, 1.0, &labels);

        debug!(
            method = %descriptor.method,
            path = %descriptor.path,
            status,
            duration_ms,
            "Request completed"
        );

        let mut pending = Vec::new();
        if duration > self.slow_threshold {
            pending.push((
                format!(
                    "Slow request detected: {} {} took {:.0}ms",
                    descriptor.method, descriptor.path, duration_ms
                ),
                Severity::Medium,
            ));
        }
        if status >= 500 {
            pending.push((
                format!(
                    "Server error: {} {} returned {}",
                    descriptor.method, descriptor.path, status
                ),
                Severity::High,
            ));
        }
        pending
    }
}
