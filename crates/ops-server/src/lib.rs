//! Ops server: HTTP front for the monitoring and cache crates
//!
//! # Components
//!
//! - **Config**: YAML file plus environment overrides, validated at load
//! - **Telemetry**: stdout logging with optional OTLP span export
//! - **HTTP**: metrics export, health, dashboard and alert endpoints
//! - **Server**: wires the stores, probes, sweepers and collector together

pub mod config;
pub mod http_server;
pub mod server;
pub mod telemetry;
pub mod types;

pub use config::{Config, ConfigError};
pub use http_server::{AppState, HttpServer, router};
pub use server::{CacheProbe, OpsServer, build_check};
pub use telemetry::{TelemetryGuard, init_tracer_provider, setup_tracing};
pub use types::{CheckKind, CheckSpec, ServerConfig};
