//! HTTP surface: metrics export, health, dashboard and alerts.

use axum::{
    Json, Router,
    extract::{MatchedPath, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use cache::CacheMetrics;
use monitoring::{
    AlertLog, Dashboard, HealthCheckRegistry, HealthStatus, RequestDescriptor,
    RequestInstrumentation, TimeSeriesStore, export_prometheus,
};
use serde::Deserialize;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Shared handles for request handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TimeSeriesStore>,
    pub alerts: Arc<AlertLog>,
    pub health: Arc<HealthCheckRegistry>,
    pub instrumentation: Arc<RequestInstrumentation>,
    pub cache_metrics: Arc<CacheMetrics>,
    dashboard: Arc<Dashboard>,
}

impl AppState {
    pub fn new(
        store: Arc<TimeSeriesStore>,
        alerts: Arc<AlertLog>,
        health: Arc<HealthCheckRegistry>,
        instrumentation: Arc<RequestInstrumentation>,
        cache_metrics: Arc<CacheMetrics>,
    ) -> Self {
        let dashboard = Arc::new(Dashboard::new(store.clone(), alerts.clone()));
        Self {
            store,
            alerts,
            health,
            instrumentation,
            cache_metrics,
            dashboard,
        }
    }
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/metrics/cache", get(cache_metrics_handler))
        .route("/health", get(health_handler))
        .route("/dashboard", get(dashboard_handler))
        .route("/alerts", get(alerts_handler))
        .route("/alerts/:id/resolve", post(resolve_alert_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::from_fn_with_state(state.clone(), track_requests)),
        )
        .with_state(state)
}

/// HTTP server for the ops endpoints
pub struct HttpServer {
    state: AppState,
    listen_addr: SocketAddr,
}

impl HttpServer {
    pub fn new(state: AppState, listen_addr: SocketAddr) -> Self {
        Self { state, listen_addr }
    }

    /// Serve until `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!(listen_addr = %self.listen_addr, "Starting HTTP server");

        let app = router(self.state);
        let listener = TcpListener::bind(self.listen_addr).await?;
        info!(listen_addr = %self.listen_addr, "HTTP server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Count and time every request. Routes are labelled by their pattern.
async fn track_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let timer = state
        .instrumentation
        .start(RequestDescriptor::new(request.method().as_str(), path));

    let response = next.run(request).await;
    state.instrumentation.finish(timer, response.status().as_u16());
    response
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        export_prometheus(&state.store),
    )
        .into_response()
}

async fn cache_metrics_handler(State(state): State<AppState>) -> Response {
    match state.cache_metrics.encode() {
        Ok(buffer) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)],
            buffer,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode cache metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
                .into_response()
        }
    }
}

async fn health_handler(State(state): State<AppState>) -> Response {
    let results = state.health.run_all().await;
    let status = if results
        .values()
        .any(|result| result.status == HealthStatus::Unhealthy)
    {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(results)).into_response()
}

async fn dashboard_handler(State(state): State<AppState>) -> Response {
    Json(state.dashboard.snapshot().await).into_response()
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    resolved: Option<bool>,
}

async fn alerts_handler(
    State(state): State<AppState>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    Json(state.alerts.list(query.resolved).await).into_response()
}

async fn resolve_alert_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    if state.alerts.resolve(&id).await {
        (
            StatusCode::OK,
            Json(serde_json::json!({ "id": id, "resolved": true })),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("alert {} not found", id) })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_server_creation() {
        let store = Arc::new(TimeSeriesStore::default());
        let alerts = Arc::new(AlertLog::default());
        let state = AppState::new(
            store.clone(),
            alerts.clone(),
            Arc::new(HealthCheckRegistry::new()),
            Arc::new(RequestInstrumentation::new(store, alerts)),
            Arc::new(CacheMetrics::new()),
        );

        let server = HttpServer::new(state, "127.0.0.1:0".parse().unwrap());
        assert_eq!(server.listen_addr.port(), 0);
    }

    #[tokio::test]
    async fn test_metrics_handler_content_type() {
        let store = Arc::new(TimeSeriesStore::default());
        let alerts = Arc::new(AlertLog::default());
        let state = AppState::new(
            store.clone(),
            alerts.clone(),
            Arc::new(HealthCheckRegistry::new()),
            Arc::new(RequestInstrumentation::new(store, alerts)),
            Arc::new(CacheMetrics::new()),
        );

        let response = metrics_handler(State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
    }
}
