//! Integration tests for the monitoring pipeline

use monitoring::collector::{EVENT_LOOP_LAG_MS, PROCESS_MEMORY_BYTES};
use monitoring::instrumentation::HTTP_REQUEST_DURATION_MS;
use monitoring::{
    AlertLog, CollectorConfig, CpuUsage, Dashboard, ExecutionMode, HealthCheckRegistry,
    HealthStatus, Labels, MemoryProbe, MemoryUsage, PeriodicCollector, ProbeReport,
    ProcessSampler, RequestDescriptor, RequestInstrumentation, Severity, TimeSeriesStore,
    export_prometheus, labels, overall_status,
};
use std::sync::Arc;
use std::time::Duration;

/// Sampler with a fixed memory ratio
struct StaticSampler {
    used: u64,
    total: u64,
}

impl ProcessSampler for StaticSampler {
    fn memory(&self) -> MemoryUsage {
        MemoryUsage {
            rss: self.used,
            heap_used: self.used,
            heap_total: self.total,
            external: 16,
        }
    }

    fn cpu(&self) -> CpuUsage {
        CpuUsage {
            user: 10,
            system: 5,
        }
    }
}

fn pipeline() -> (Arc<TimeSeriesStore>, Arc<AlertLog>) {
    (Arc::new(TimeSeriesStore::default()), Arc::new(AlertLog::default()))
}

#[tokio::test]
async fn test_slow_request_scenario() {
    let (store, alerts) = pipeline();
    let instr = RequestInstrumentation::new(store.clone(), alerts.clone());

    instr
        .record_completion(&RequestDescriptor::new("GET", "/slow"), 200, Duration::from_millis(6000))
        .await;

    let open = alerts.list(None).await;
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].severity, Severity::Medium);
    assert!(open[0].message.contains("/slow"));
    assert!(open[0].message.contains("6000"));

    let stats = store.query(HTTP_REQUEST_DURATION_MS, &labels([("path", "/slow")]), None);
    assert_eq!(stats.count, 1);
    assert_eq!(stats.max, 6000.0);
}

#[tokio::test]
async fn test_collector_feeds_dashboard_and_export() {
    let (store, alerts) = pipeline();
    let collector = PeriodicCollector::new(
        store.clone(),
        alerts.clone(),
        Arc::new(StaticSampler { used: 95, total: 100 }),
        CollectorConfig::default(),
    );
    collector.collect_once().await;

    let snapshot = Dashboard::new(store.clone(), alerts.clone()).snapshot().await;
    assert_eq!(snapshot.memory.len(), 4);
    assert_eq!(snapshot.memory["heap_used"], 95.0);
    assert_eq!(snapshot.event_loop_lag.count, 1);
    assert!(snapshot.alerts.iter().any(|a| a.severity == Severity::High));

    let text = export_prometheus(&store);
    assert!(text.contains("process_memory_bytes{type=\"rss\"} 95 "));
    assert!(text.lines().any(|l| l.starts_with(EVENT_LOOP_LAG_MS)));
}

#[tokio::test(start_paused = true)]
async fn test_collector_runs_on_interval() {
    let (store, alerts) = pipeline();
    let collector = Arc::new(PeriodicCollector::new(
        store.clone(),
        alerts,
        Arc::new(StaticSampler { used: 10, total: 100 }),
        CollectorConfig {
            interval: Duration::from_secs(30),
            ..CollectorConfig::default()
        },
    ));

    let task = collector.start();
    tokio::time::sleep(Duration::from_secs(95)).await;
    task.stop().await;

    let samples = store.samples(PROCESS_MEMORY_BYTES, &labels([("type", "rss")]));
    assert_eq!(samples.len(), 3);
}

#[tokio::test]
async fn test_health_registry_with_memory_probe() {
    let registry = HealthCheckRegistry::with_mode(ExecutionMode::Concurrent {
        timeout: Duration::from_secs(1),
    });
    registry
        .register(
            "memory",
            Arc::new(MemoryProbe::new(Arc::new(StaticSampler { used: 95, total: 100 }), 0.9)),
        )
        .await;
    registry
        .register_fn("database", || async { Ok(ProbeReport::healthy()) })
        .await;

    let results = registry.run_all().await;
    assert_eq!(results["memory"].status, HealthStatus::Degraded);
    assert!(results["database"].is_healthy());
    assert_eq!(overall_status(results.values()), HealthStatus::Degraded);

    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json["memory"]["status"], "degraded");
    assert!(json["memory"]["latencyMs"].is_number());
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_bounds_memory() {
    let store = Arc::new(TimeSeriesStore::new(monitoring::TimeSeriesConfig {
        max_samples_per_key: 100,
        retention: Duration::from_secs(60),
        ..monitoring::TimeSeriesConfig::default()
    }));
    let old = chrono::Utc::now() - chrono::Duration::seconds(3600);
    store.record_at("stale", 1.0, &Labels::new(), old);

    let task = store.start_sweeper(Duration::from_secs(60));
    tokio::time::sleep(Duration::from_secs(61)).await;
    task.stop().await;

    assert_eq!(store.series_count(), 0);
}
