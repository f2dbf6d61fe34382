//! Runtime configuration for the ops server.

use monitoring::ExecutionMode;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Health check declared in configuration and registered at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckSpec {
    pub name: String,

    #[serde(with = "humantime_serde", default = "default_check_timeout")]
    pub timeout: Duration,

    #[serde(flatten)]
    pub kind: CheckKind,
}

/// Check-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CheckKind {
    Tcp {
        target: SocketAddr,
    },
    Http {
        url: String,
        #[serde(default = "default_check_method")]
        method: String,
        /// Empty accepts any 2xx
        #[serde(default)]
        expected_codes: Vec<u16>,
    },
}

fn default_check_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_check_method() -> String {
    "GET".to_string()
}

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen_addr: SocketAddr,

    /// Redis connection URL
    pub redis_url: String,

    /// Timeout for establishing the Redis connection
    pub redis_connect_timeout: Duration,

    /// TTL applied to cache writes without one
    pub cache_default_ttl: Duration,

    /// Session lifetime
    pub session_ttl: Duration,

    /// Samples retained per metric series
    pub metrics_max_samples: usize,

    /// Distinct series before new ones are dropped
    pub metrics_max_series: usize,

    /// Age after which samples are swept
    pub metrics_retention: Duration,

    /// Interval between metric sweeps
    pub metrics_sweep_interval: Duration,

    /// Alert log capacity
    pub alerts_max: usize,

    /// Age after which resolved alerts are swept
    pub alerts_retention: Duration,

    /// Interval between alert sweeps
    pub alerts_sweep_interval: Duration,

    /// Process sampling interval
    pub collector_interval: Duration,

    /// Memory usage ratio that raises a high alert
    pub memory_alert_ratio: f64,

    /// Scheduler lag that raises a medium alert
    pub lag_alert_threshold: Duration,

    /// Memory budget used as heap total, system memory when unset
    pub memory_limit_bytes: Option<u64>,

    /// Request duration that raises a slow-request alert
    pub slow_request_threshold: Duration,

    /// Health probe scheduling
    pub health_mode: ExecutionMode,

    /// Memory usage ratio at which the memory probe reports degraded
    pub memory_degraded_ratio: f64,

    /// Extra TCP and HTTP checks
    pub health_checks: Vec<CheckSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            redis_connect_timeout: Duration::from_secs(5),
            cache_default_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(3600),
            metrics_max_samples: 1000,
            metrics_max_series: monitoring::DEFAULT_MAX_SERIES,
            metrics_retention: Duration::from_secs(24 * 60 * 60),
            metrics_sweep_interval: Duration::from_secs(60),
            alerts_max: 100,
            alerts_retention: Duration::from_secs(24 * 60 * 60),
            alerts_sweep_interval: Duration::from_secs(60),
            collector_interval: Duration::from_secs(30),
            memory_alert_ratio: 0.9,
            lag_alert_threshold: Duration::from_millis(100),
            memory_limit_bytes: None,
            slow_request_threshold: Duration::from_millis(5000),
            health_mode: ExecutionMode::Sequential,
            memory_degraded_ratio: 0.9,
            health_checks: Vec::new(),
        }
    }
}
