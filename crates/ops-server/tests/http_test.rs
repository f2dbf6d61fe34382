//! Route tests for the ops HTTP surface

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::Router;
use cache::CacheMetrics;
use monitoring::{
    AlertLog, HealthCheckRegistry, ProbeReport, RequestInstrumentation, Severity, TimeSeriesStore,
    labels,
};
use ops_server::{AppState, router};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Test fixture holding the shared handles behind a router
struct Fixture {
    store: Arc<TimeSeriesStore>,
    alerts: Arc<AlertLog>,
    health: Arc<HealthCheckRegistry>,
    cache_metrics: Arc<CacheMetrics>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(TimeSeriesStore::default()),
            alerts: Arc::new(AlertLog::default()),
            health: Arc::new(HealthCheckRegistry::new()),
            cache_metrics: Arc::new(CacheMetrics::new()),
        }
    }

    fn app(&self) -> Router {
        router(AppState::new(
            self.store.clone(),
            self.alerts.clone(),
            self.health.clone(),
            Arc::new(RequestInstrumentation::new(
                self.store.clone(),
                self.alerts.clone(),
            )),
            self.cache_metrics.clone(),
        ))
    }
}

async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_health_reports_503_when_a_probe_is_unhealthy() {
    let fixture = Fixture::new();
    fixture
        .health
        .register_fn("cache", || async { Ok(ProbeReport::healthy()) })
        .await;
    fixture
        .health
        .register_fn("database", || async {
            Ok(ProbeReport::unhealthy("connection refused"))
        })
        .await;

    let (status, body) = send(fixture.app(), "GET", "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["cache"]["status"], "healthy");
    assert_eq!(json["database"]["status"], "unhealthy");
    assert_eq!(json["database"]["error"], "connection refused");
}

#[tokio::test]
async fn test_health_degraded_is_still_ok() {
    let fixture = Fixture::new();
    fixture
        .health
        .register_fn("memory", || async { Ok(ProbeReport::degraded("92%")) })
        .await;

    let (status, body) = send(fixture.app(), "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"degraded\""));
}

#[tokio::test]
async fn test_resolve_alert_over_http() {
    let fixture = Fixture::new();
    let alert = fixture.alerts.create("Disk almost full", Severity::High).await;

    let (status, _) = send(fixture.app(), "POST", "/alerts/missing/resolve").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/alerts/{}/resolve", alert.id);
    let (status, body) = send(fixture.app(), "POST", &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("\"resolved\":true"));

    let (_, body) = send(fixture.app(), "GET", "/alerts?resolved=false").await;
    let open: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert!(open.is_empty());

    let (_, body) = send(fixture.app(), "GET", "/alerts?resolved=true").await;
    let resolved: Vec<Value> = serde_json::from_str(&body).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0]["message"], "Disk almost full");
}

#[tokio::test]
async fn test_requests_are_labelled_by_route() {
    let fixture = Fixture::new();

    send(fixture.app(), "POST", "/alerts/abc/resolve").await;
    send(fixture.app(), "GET", "/no/such/route").await;

    let (status, body) = send(fixture.app(), "GET", "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("http_requests_total{method=\"POST\",path=\"/alerts/:id/resolve\"} 1 "));
    assert!(body.contains("path=\"/no/such/route\",status_code=\"404\"}"));

    let not_found = fixture.store.query(
        "http_responses_total",
        &labels([("status_code", "404")]),
        None,
    );
    assert_eq!(not_found.count, 2);
}

#[tokio::test]
async fn test_dashboard_snapshot_shape() {
    let fixture = Fixture::new();
    fixture.store.record(
        "process_memory_bytes",
        1024.0,
        &labels([("type", "rss")]),
    );
    fixture.alerts.create("Slow", Severity::Medium).await;

    let (status, body) = send(fixture.app(), "GET", "/dashboard").await;
    assert_eq!(status, StatusCode::OK);

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["memory"]["rss"], 1024.0);
    assert_eq!(json["alerts"].as_array().unwrap().len(), 1);
    assert!(json.get("responseTime").is_some());
    assert!(json.get("eventLoopLag").is_some());
}

#[tokio::test]
async fn test_cache_metrics_endpoint() {
    let fixture = Fixture::new();
    fixture.cache_metrics.record_operation("get", "hit");

    let (status, body) = send(fixture.app(), "GET", "/metrics/cache").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("cache_operations_total{operation=\"get\",outcome=\"hit\"} 1"));
}
