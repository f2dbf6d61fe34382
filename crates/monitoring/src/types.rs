//! Metric, alert and health check types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Label set attached to a metric series. Keys are kept sorted.
pub type Labels = BTreeMap<String, String>;

/// Build a label set from key/value pairs.
pub fn labels<I, K, V>(pairs: I) -> Labels
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Canonical identity of a `(name, labels)` pair.
///
/// Label keys iterate in sorted order, so the same pairs inserted in any
/// order always produce the same key. Delimiters inside names, keys and
/// values are backslash-escaped, so distinct label sets never share a key.
pub fn metric_key(name: &str, labels: &Labels) -> String {
    let mut key = String::with_capacity(name.len() + labels.len() * 16);
    push_escaped(&mut key, name);
    if labels.is_empty() {
        return key;
    }

    key.push('{');
    for (i, (k, v)) in labels.iter().enumerate() {
        if i > 0 {
            key.push(',');
        }
        push_escaped(&mut key, k);
        key.push('=');
        push_escaped(&mut key, v);
    }
    key.push('}');
    key
}

fn push_escaped(key: &mut String, part: &str) {
    for c in part.chars() {
        if matches!(c, '\\' | ',' | '=' | '{' | '}') {
            key.push('\\');
        }
        key.push(c);
    }
}

/// A single timestamped measurement
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Inclusive time range used to scope queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range covering `[start, end]`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Range covering the trailing `window` up to `now`
    pub fn trailing(now: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            start: now - window,
            end: now,
        }
    }

    /// Whether `ts` lies inside the range (both ends inclusive)
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Aggregate over a set of samples
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
}

impl MetricStats {
    /// Fold samples into stats. Empty input yields all zeros.
    pub fn from_values<I: IntoIterator<Item = f64>>(values: I) -> Self {
        let mut stats = MetricStats::default();
        for value in values {
            if stats.count == 0 {
                stats.min = value;
                stats.max = value;
            } else {
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
            }
            stats.count += 1;
            stats.sum += value;
        }
        if stats.count > 0 {
            stats.avg = stats.sum / stats.count as f64;
        }
        stats
    }
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// A detected abnormal condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub resolved: bool,
}

/// Health check status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Dependency is healthy
    Healthy,
    /// Dependency works but is impaired
    Degraded,
    /// Dependency is failing
    Unhealthy,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "HEALTHY"),
            HealthStatus::Degraded => write!(f, "DEGRADED"),
            HealthStatus::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

/// Result of one probe execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl HealthCheckResult {
    /// Check if the result is healthy
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}
