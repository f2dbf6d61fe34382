//! Bounded, severity-tagged alert log.

use crate::task::PeriodicTask;
use crate::types::{Alert, Severity};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default alert capacity
pub const DEFAULT_MAX_ALERTS: usize = 100;

/// Default age after which resolved alerts are swept
pub const DEFAULT_ALERT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

/// Receives critical alerts as they are created
pub trait AlertSink: Send + Sync {
    /// Deliver an alert. Called synchronously from `AlertLog::create`.
    fn notify(&self, alert: &Alert);
}

/// Sink that writes critical alerts to the operational log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AlertSink for TracingSink {
    fn notify(&self, alert: &Alert) {
        error!(
            alert_id = %alert.id,
            severity = %alert.severity,
            "CRITICAL ALERT: {}",
            alert.message
        );
    }
}

/// Alert log configuration
#[derive(Debug, Clone, Copy)]
pub struct AlertLogConfig {
    pub max_alerts: usize,
    pub retention: Duration,
}

impl Default for AlertLogConfig {
    fn default() -> Self {
        Self {
            max_alerts: DEFAULT_MAX_ALERTS,
            retention: DEFAULT_ALERT_RETENTION,
        }
    }
}

/// Newest-first alert log capped at `max_alerts`.
///
/// Capacity eviction drops the oldest entry whether or not it is resolved.
/// Unresolved alerts are only exempt from the age-based sweep.
pub struct AlertLog {
    alerts: RwLock<VecDeque<Alert>>,
    config: AlertLogConfig,
    sink: Arc<dyn AlertSink>,
}

impl AlertLog {
    /// Create a log that reports critical alerts through `TracingSink`
    pub fn new(config: AlertLogConfig) -> Self {
        Self::with_sink(config, Arc::new(TracingSink))
    }

    /// Create a log with a custom critical-alert sink
    pub fn with_sink(config: AlertLogConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            alerts: RwLock::new(VecDeque::new()),
            config: AlertLogConfig {
                max_alerts: config.max_alerts.max(1),
                retention: config.retention,
            },
            sink,
        }
    }

    /// Record a new alert and return a copy of it
    pub async fn create(&self, message: impl Into<String>, severity: Severity) -> Alert {
        let alert = Alert {
            id: Uuid::now_v7().to_string(),
            message: message.into(),
            severity,
            timestamp: Utc::now(),
            resolved: false,
        };

        {
            let mut alerts = self.alerts.write().await;
            alerts.push_front(alert.clone());
            if alerts.len() > self.config.max_alerts {
                if let Some(evicted) = alerts.pop_back() {
                    if !evicted.resolved {
                        debug!(alert_id = %evicted.id, "Evicted unresolved alert at capacity");
                    }
                }
            }
        }

        match severity {
            Severity::Critical => self.sink.notify(&alert),
            Severity::High => warn!(alert_id = %alert.id, "Alert raised: {}", alert.message),
            Severity::Medium | Severity::Low => {
                info!(alert_id = %alert.id, severity = %severity, "Alert raised: {}", alert.message)
            }
        }

        alert
    }

    /// Mark an alert resolved. Returns false for unknown ids.
    pub async fn resolve(&self, id: &str) -> bool {
        let mut alerts = self.alerts.write().await;
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) => {
                alert.resolved = true;
                info!(alert_id = %id, "Alert resolved");
                true
            }
            None => false,
        }
    }

    /// List alerts newest first, optionally filtered by the resolved flag
    pub async fn list(&self, resolved: Option<bool>) -> Vec<Alert> {
        self.alerts
            .read()
            .await
            .iter()
            .filter(|a| resolved.is_none_or(|r| a.resolved == r))
            .cloned()
            .collect()
    }

    /// Number of retained alerts
    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.alerts.read().await.is_empty()
    }

    /// Keep alerts newer than the retention window or still unresolved.
    /// Returns the number removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::Duration::from_std(self.config.retention)
            .unwrap_or_else(|_| chrono::Duration::weeks(52 * 100));
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut alerts = self.alerts.write().await;
        let before = alerts.len();
        alerts.retain(|a| a.timestamp > cutoff || !a.resolved);
        let removed = before - alerts.len();

        debug!(removed, remaining = alerts.len(), "Alert retention sweep");
        removed
    }

    /// Run the retention sweep on a timer
    pub fn start_sweeper(self: &Arc<Self>, period: Duration) -> PeriodicTask {
        let log = Arc::clone(self);
        PeriodicTask::spawn("alerts-sweeper", period, move || {
            let log = log.clone();
            async move {
                log.sweep(Utc::now()).await;
            }
        })
    }

    #[cfg(test)]
    pub(crate) async fn backdate(&self, id: &str, timestamp: DateTime<Utc>) {
        let mut alerts = self.alerts.write().await;
        if let Some(alert) = alerts.iter_mut().find(|a| a.id == id) {
            alert.timestamp = timestamp;
        }
    }
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(AlertLogConfig::default())
    }
}
