//! Config file loading tests

use ops_server::{Config, ConfigError};
use std::path::PathBuf;
use std::time::Duration;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("{}-{}.yaml", name, std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn test_load_from_file() {
    let path = write_config(
        "ops-config-full",
        r#"
server:
  listen_addr: "127.0.0.1:3100"
redis:
  url: "redis://cache:6379/4"
cache:
  default_ttl: 15m
  session_ttl: 2h
alerts:
  max_alerts: 25
  retention: 1h
telemetry:
  enabled: true
  protocol: http
  otlp_endpoint: "http://collector:4318/v1/traces"
logging:
  level: debug
  format: json
"#,
    );

    let config = Config::load_from_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let server = config.to_server_config().unwrap();
    assert_eq!(server.redis_url, "redis://cache:6379/4");
    assert_eq!(server.cache_default_ttl, Duration::from_secs(900));
    assert_eq!(server.session_ttl, Duration::from_secs(7200));
    assert_eq!(server.alerts_max, 25);
    assert_eq!(server.alerts_retention, Duration::from_secs(3600));
    assert!(config.telemetry.enabled);
    assert_eq!(config.logging.format.as_deref(), Some("json"));
}

#[test]
fn test_load_rejects_invalid_values() {
    let path = write_config(
        "ops-config-invalid",
        r#"
cache:
  default_ttl: 0s
"#,
    );

    let result = Config::load_from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ConfigError::ValidationError(_))));
}

#[test]
fn test_load_rejects_malformed_yaml() {
    let path = write_config("ops-config-malformed", "metrics: [unclosed");

    let result = Config::load_from_file(&path);
    std::fs::remove_file(&path).unwrap();
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn test_missing_file() {
    let result = Config::load_from_file("/nonexistent/ops-server.yaml");
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}
