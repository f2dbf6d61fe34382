//! Configuration loading and validation for the ops server

use crate::types::{CheckKind, CheckSpec, ServerConfig};
use monitoring::{ExecutionMode, HttpMethod};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "OPS_SERVER_CONFIG";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub redis: RedisSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub metrics: MetricsSettings,

    #[serde(default)]
    pub alerts: AlertSettings,

    #[serde(default)]
    pub collector: CollectorSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub telemetry: TelemetrySettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Validate for Config {
    fn validate(&self) -> Result<(), validator::ValidationErrors> {
        self.server.validate()?;
        self.redis.validate()?;
        self.cache.validate()?;
        self.metrics.validate()?;
        self.alerts.validate()?;
        self.collector.validate()?;
        self.health.validate()?;
        validate_checks(&self.health.checks)?;
        Ok(())
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerSettings {
    #[validate(custom = "validate_listen_addr")]
    pub listen_addr: String,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_threshold")]
    pub slow_request_threshold: Duration,
}

/// Redis connection settings. `url` wins over the individual fields.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RedisSettings {
    pub url: Option<String>,

    #[validate(length(min = 1))]
    pub host: String,

    #[validate(range(min = 1))]
    pub port: u16,

    pub password: Option<String>,

    #[validate(range(max = 15))]
    pub db: u8,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_threshold")]
    pub connect_timeout: Duration,
}

/// Cache settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_ttl")]
    pub default_ttl: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_ttl")]
    pub session_ttl: Duration,
}

/// Time-series store settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MetricsSettings {
    #[validate(range(min = 1, max = 1000000))]
    pub max_samples_per_key: usize,

    /// Distinct series kept before new ones are dropped
    #[validate(range(min = 1))]
    pub max_series: usize,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_retention")]
    pub retention: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub sweep_interval: Duration,
}

/// Alert log settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AlertSettings {
    #[validate(range(min = 1, max = 100000))]
    pub max_alerts: usize,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_retention")]
    pub retention: Duration,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub sweep_interval: Duration,
}

/// Process collector settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CollectorSettings {
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_interval")]
    pub interval: Duration,

    #[validate(range(min = 0.01, max = 1.0))]
    pub memory_alert_ratio: f64,

    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_threshold")]
    pub lag_threshold: Duration,

    pub memory_limit_bytes: Option<u64>,
}

/// Probe scheduling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthModeSetting {
    #[default]
    Sequential,
    Concurrent,
}

/// Health check settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct HealthSettings {
    pub mode: HealthModeSetting,

    /// Per-probe timeout in concurrent mode
    #[serde(with = "humantime_serde")]
    #[validate(custom = "validate_threshold")]
    pub timeout: Duration,

    /// Ratio of the memory budget at which the memory probe degrades
    #[validate(range(min = 0.01, max = 1.0))]
    pub memory_degraded_ratio: f64,

    /// TCP and HTTP checks registered after the built-in ones
    pub checks: Vec<CheckSpec>,
}

/// OTLP transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    #[default]
    Grpc,
    Http,
}

/// OpenTelemetry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySettings {
    pub enabled: bool,
    pub service_name: String,
    pub otlp_endpoint: String,
    pub protocol: OtlpProtocol,
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub format: Option<String>,
}

// Default implementations

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".to_string(),
            slow_request_threshold: Duration::from_millis(5000),
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            db: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(3600),
            session_ttl: Duration::from_secs(3600),
        }
    }
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            max_samples_per_key: 1000,
            max_series: monitoring::DEFAULT_MAX_SERIES,
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            max_alerts: 100,
            retention: Duration::from_secs(24 * 60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            memory_alert_ratio: 0.9,
            lag_threshold: Duration::from_millis(100),
            memory_limit_bytes: None,
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            mode: HealthModeSetting::Sequential,
            timeout: Duration::from_secs(5),
            memory_degraded_ratio: 0.9,
            checks: Vec::new(),
        }
    }
}

impl Default for TelemetrySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            service_name: "ops-server".to_string(),
            otlp_endpoint: "http://localhost:4317".to_string(),
            protocol: OtlpProtocol::Grpc,
        }
    }
}

// Custom validators

fn validate_listen_addr(addr: &str) -> Result<(), ValidationError> {
    addr.trim()
        .parse::<SocketAddr>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("listen_addr_invalid"))
}

fn validate_ttl(ttl: &Duration) -> Result<(), ValidationError> {
    if ttl.as_secs() < 1 || ttl.as_secs() > 30 * 24 * 60 * 60 {
        return Err(ValidationError::new("ttl_out_of_range"));
    }
    Ok(())
}

fn validate_retention(retention: &Duration) -> Result<(), ValidationError> {
    if retention.as_secs() < 1 {
        return Err(ValidationError::new("retention_too_short"));
    }
    Ok(())
}

fn validate_interval(interval: &Duration) -> Result<(), ValidationError> {
    let millis = interval.as_millis();
    if !(100..=3_600_000).contains(&millis) {
        return Err(ValidationError::new("interval_out_of_range"));
    }
    Ok(())
}

fn validate_threshold(threshold: &Duration) -> Result<(), ValidationError> {
    if threshold.is_zero() {
        return Err(ValidationError::new("threshold_zero"));
    }
    Ok(())
}

const BUILTIN_CHECKS: [&str; 2] = ["cache", "memory"];

fn validate_checks(checks: &[CheckSpec]) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::new();
    let mut seen = std::collections::HashSet::new();

    for check in checks {
        let name = check.name.trim();
        if name.is_empty() {
            errors.add("checks", ValidationError::new("check_name_empty"));
        } else if BUILTIN_CHECKS.contains(&name) || !seen.insert(name) {
            errors.add("checks", ValidationError::new("check_name_duplicate"));
        }
        if let Err(e) = validate_threshold(&check.timeout) {
            errors.add("checks", e);
        }
        if let CheckKind::Http { url, method, .. } = &check.kind {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.add("checks", ValidationError::new("check_url_invalid"));
            }
            if HttpMethod::from_bytes(method.to_uppercase().as_bytes()).is_err() {
                errors.add("checks", ValidationError::new("check_method_invalid"));
            }
        }
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

// Configuration loading implementation

impl Config {
    /// Load from the search paths, then apply environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(|var| std::env::var(var).ok())
    }

    /// Load using `lookup` to read environment variables
    pub fn load_with_env(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(CONFIG_PATH_ENV) {
            Some(path) => {
                let path = PathBuf::from(path);
                if !path.is_file() {
                    return Err(ConfigError::FileNotFound(path));
                }
                tracing::info!("Loading configuration from: {}", path.display());
                Self::parse_file(&path)?
            }
            None => match Self::find_config_file() {
                Some(path) => {
                    tracing::info!("Loading configuration from: {}", path.display());
                    Self::parse_file(&path)?
                }
                None => {
                    tracing::info!("No configuration file found, using defaults");
                    Self::default()
                }
            },
        };

        config.apply_env_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Option<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/ops/ops-server.yaml")];

        if let Some(home_path) = Self::home_config_path() {
            paths.push(home_path);
        }

        paths.push(PathBuf::from("./ops-server.yaml"));

        paths.into_iter().find(|p: &PathBuf| p.exists() && p.is_file())
    }

    /// Get home directory config path
    fn home_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".config/ops/ops-server.yaml"))
    }

    /// Override file values with environment variables
    pub fn apply_env_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("REDIS_URL") {
            self.redis.url = Some(url);
        }
        if let Some(host) = get("REDIS_HOST") {
            self.redis.host = host;
        }
        if let Some(port) = get("REDIS_PORT") {
            self.redis.port = parse_env("REDIS_PORT", &port)?;
        }
        if let Some(password) = get("REDIS_PASSWORD") {
            self.redis.password = Some(password);
        }
        if let Some(db) = get("REDIS_DB") {
            self.redis.db = parse_env("REDIS_DB", &db)?;
        }
        if let Some(ttl) = get("CACHE_DEFAULT_TTL") {
            self.cache.default_ttl = parse_env_duration("CACHE_DEFAULT_TTL", &ttl)?;
        }
        if let Some(retention) = get("METRICS_RETENTION") {
            self.metrics.retention = parse_env_duration("METRICS_RETENTION", &retention)?;
        }
        if let Some(max) = get("METRICS_MAX_SAMPLES") {
            self.metrics.max_samples_per_key = parse_env("METRICS_MAX_SAMPLES", &max)?;
        }
        if let Some(max) = get("METRICS_MAX_SERIES") {
            self.metrics.max_series = parse_env("METRICS_MAX_SERIES", &max)?;
        }
        if let Some(max) = get("ALERTS_MAX") {
            self.alerts.max_alerts = parse_env("ALERTS_MAX", &max)?;
        }
        if let Some(interval) = get("COLLECTOR_INTERVAL") {
            self.collector.interval = parse_env_duration("COLLECTOR_INTERVAL", &interval)?;
        }
        if let Some(addr) = get("LISTEN_ADDR") {
            self.server.listen_addr = addr;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.logging.level = Some(level);
        }
        Ok(())
    }

    /// Redis URL from `redis.url` or the individual connection fields
    pub fn redis_url(&self) -> String {
        if let Some(url) = &self.redis.url {
            return url.clone();
        }

        let host = if self.redis.host.contains(':') && !self.redis.host.starts_with('[') {
            format!("[{}]", self.redis.host)
        } else {
            self.redis.host.clone()
        };
        match &self.redis.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                urlencoding::encode(password),
                host,
                self.redis.port,
                self.redis.db
            ),
            None => format!("redis://{}:{}/{}", host, self.redis.port, self.redis.db),
        }
    }

    /// Convert to the runtime ServerConfig
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let listen_addr = self
            .server
            .listen_addr
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidEnv {
                var: "LISTEN_ADDR",
                value: self.server.listen_addr.clone(),
            })?;

        let health_mode = match self.health.mode {
            HealthModeSetting::Sequential => ExecutionMode::Sequential,
            HealthModeSetting::Concurrent => ExecutionMode::Concurrent {
                timeout: self.health.timeout,
            },
        };

        Ok(ServerConfig {
            listen_addr,
            redis_url: self.redis_url(),
            redis_connect_timeout: self.redis.connect_timeout,
            cache_default_ttl: self.cache.default_ttl,
            session_ttl: self.cache.session_ttl,
            metrics_max_samples: self.metrics.max_samples_per_key,
            metrics_max_series: self.metrics.max_series,
            metrics_retention: self.metrics.retention,
            metrics_sweep_interval: self.metrics.sweep_interval,
            alerts_max: self.alerts.max_alerts,
            alerts_retention: self.alerts.retention,
            alerts_sweep_interval: self.alerts.sweep_interval,
            collector_interval: self.collector.interval,
            memory_alert_ratio: self.collector.memory_alert_ratio,
            lag_alert_threshold: self.collector.lag_threshold,
            memory_limit_bytes: self.collector.memory_limit_bytes,
            slow_request_threshold: self.server.slow_request_threshold,
            health_mode,
            memory_degraded_ratio: self.health.memory_degraded_ratio,
            health_checks: self.health.checks.clone(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}

/// Bare integers are seconds, anything else is a humantime duration
fn parse_env_duration(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime_serde::re::humantime::parse_duration(trimmed).map_err(|_| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
    })
}
