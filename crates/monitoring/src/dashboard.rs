//! Read-only aggregate view over metrics and alerts.

use crate::alerts::AlertLog;
use crate::collector::{EVENT_LOOP_LAG_MS, PROCESS_MEMORY_BYTES};
use crate::instrumentation::{HTTP_REQUEST_DURATION_MS, HTTP_REQUESTS_TOTAL, HTTP_RESPONSES_TOTAL};
use crate::timeseries::TimeSeriesStore;
use crate::types::{Alert, Labels, MetricStats, TimeRange, labels};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;

/// Dashboard aggregate for the trailing hour
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSnapshot {
    pub requests: MetricStats,
    pub response_time: MetricStats,
    pub errors: MetricStats,
    /// Latest `process_memory_bytes` value per memory type
    pub memory: BTreeMap<String, f64>,
    pub event_loop_lag: MetricStats,
    /// Unresolved alerts, newest first
    pub alerts: Vec<Alert>,
    /// Seconds since the dashboard was created
    pub uptime: f64,
}

pub struct Dashboard {
    store: Arc<TimeSeriesStore>,
    alerts: Arc<AlertLog>,
    window: chrono::Duration,
    started: Instant,
}

impl Dashboard {
    pub fn new(store: Arc<TimeSeriesStore>, alerts: Arc<AlertLog>) -> Self {
        Self {
            store,
            alerts,
            window: chrono::Duration::hours(1),
            started: Instant::now(),
        }
    }

    pub async fn snapshot(&self) -> DashboardSnapshot {
        let range = Some(TimeRange::trailing(Utc::now(), self.window));
        let all = Labels::new();

        let memory = self
            .store
            .latest(Some(PROCESS_MEMORY_BYTES))
            .into_iter()
            .filter_map(|latest| {
                let kind = latest.labels.get("type")?.clone();
                Some((kind, latest.sample.value))
            })
            .collect();

        DashboardSnapshot {
            requests: self.store.query(HTTP_REQUESTS_TOTAL, &all, range),
            response_time: self.store.query(HTTP_REQUEST_DURATION_MS, &all, range),
            errors: self
                .store
                .query(HTTP_RESPONSES_TOTAL, &labels([("status_code", "500")]), range),
            memory,
            event_loop_lag: self.store.query(EVENT_LOOP_LAG_MS, &all, range),
            alerts: self.alerts.list(Some(false)).await,
            uptime: self.started.elapsed().as_secs_f64(),
        }
    }
}
