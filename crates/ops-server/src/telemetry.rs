//! Tracing subscriber setup with optional OpenTelemetry export

use crate::config::{LoggingSettings, OtlpProtocol, TelemetrySettings};
use common::logging::{self, LogFormat};
use opentelemetry::{KeyValue, trace::TracerProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    Resource, runtime,
    trace::{RandomIdGenerator, Sampler, TracerProvider},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default log level when neither RUST_LOG nor the config sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// OpenTelemetry tracer guard
///
/// When dropped, flushes all pending spans and shuts down the tracer
pub struct TelemetryGuard;

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        opentelemetry::global::shutdown_tracer_provider();
    }
}

/// Build a tracer provider exporting over OTLP
pub fn init_tracer_provider(settings: &TelemetrySettings) -> common::Result<TracerProvider> {
    let builder = opentelemetry_otlp::SpanExporter::builder();
    let exporter = match settings.protocol {
        OtlpProtocol::Grpc => builder
            .with_tonic()
            .with_endpoint(settings.otlp_endpoint.as_str())
            .build(),
        OtlpProtocol::Http => builder
            .with_http()
            .with_endpoint(settings.otlp_endpoint.as_str())
            .build(),
    }
    .map_err(common::Error::telemetry)?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", settings.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION").to_string()),
    ]);

    Ok(TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_config(
            opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource),
        )
        .build())
}

/// Install the global subscriber.
///
/// Logs go to stdout in the configured format. When telemetry is enabled,
/// spans are also exported and the returned guard must be kept alive.
pub async fn setup_tracing(
    telemetry: &TelemetrySettings,
    logging_settings: &LoggingSettings,
) -> common::Result<Option<TelemetryGuard>> {
    let level = logging_settings
        .level
        .as_deref()
        .unwrap_or(DEFAULT_LOG_LEVEL);
    let format = LogFormat::parse(logging_settings.format.as_deref());

    let provider = if telemetry.enabled {
        Some(init_tracer_provider(telemetry)?)
    } else {
        None
    };

    let otel_layer = provider.as_ref().map(|provider| {
        tracing_opentelemetry::layer().with_tracer(provider.tracer("ops-server"))
    });

    tracing_subscriber::registry()
        .with(logging::fmt_layer(format))
        .with(logging::env_filter(level))
        .with(otel_layer)
        .try_init()
        .map_err(common::Error::telemetry)?;

    match provider {
        Some(provider) => {
            opentelemetry::global::set_tracer_provider(provider);
            tracing::info!(
                service_name = %telemetry.service_name,
                otlp_endpoint = %telemetry.otlp_endpoint,
                "Tracing initialized with OpenTelemetry integration"
            );
            Ok(Some(TelemetryGuard))
        }
        None => {
            tracing::info!("Tracing initialized without OpenTelemetry");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_telemetry_disabled_installs_once() {
        let telemetry = TelemetrySettings::default();
        let logging_settings = LoggingSettings {
            level: Some("warn".into()),
            format: Some("json".into()),
        };

        let first = setup_tracing(&telemetry, &logging_settings).await;
        assert!(first.unwrap().is_none());

        // A global subscriber is already set
        let second = setup_tracing(&telemetry, &logging_settings).await;
        assert!(matches!(second, Err(common::Error::Telemetry(_))));
    }
}
