//! Ops server wiring.

use crate::http_server::{AppState, HttpServer};
use crate::types::{CheckKind, CheckSpec, ServerConfig};
use async_trait::async_trait;
use cache::{CacheClient, CacheMetrics, RateLimiter, RedisStore, SessionStore};
use monitoring::{
    AlertLog, AlertLogConfig, CollectorConfig, HealthCheckRegistry, HealthProbe, HttpMethod,
    HttpProbe, MemoryProbe, PeriodicCollector, ProbeReport, ProbeResult, ProcessSampler,
    RequestInstrumentation, SystemSampler, TcpProbe, TimeSeriesConfig, TimeSeriesStore,
};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{info, warn};

/// Reports the cache backend as unhealthy when it does not answer PING
pub struct CacheProbe {
    client: CacheClient,
}

impl CacheProbe {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HealthProbe for CacheProbe {
    async fn check(&self) -> ProbeResult {
        let started = Instant::now();
        if self.client.ping().await {
            Ok(ProbeReport::healthy()
                .with_metadata("pingMs", started.elapsed().as_secs_f64() * 1000.0))
        } else {
            Ok(ProbeReport::unhealthy("Cache backend did not answer PING"))
        }
    }
}

/// Build the probe behind a configured check
pub fn build_check(spec: &CheckSpec) -> common::Result<Arc<dyn HealthProbe>> {
    match &spec.kind {
        CheckKind::Tcp { target } => Ok(Arc::new(TcpProbe::new(*target, spec.timeout))),
        CheckKind::Http {
            url,
            method,
            expected_codes,
        } => {
            let method = HttpMethod::from_bytes(method.to_uppercase().as_bytes()).map_err(|_| {
                common::Error::healthcheck(format!("Invalid HTTP method for {}: {}", spec.name, method))
            })?;
            let probe = HttpProbe::new(url.clone(), method, expected_codes.clone(), spec.timeout)?;
            Ok(Arc::new(probe))
        }
    }
}

/// Observability and caching core behind one HTTP listener
pub struct OpsServer {
    config: ServerConfig,
    store: Arc<TimeSeriesStore>,
    alerts: Arc<AlertLog>,
    health: Arc<HealthCheckRegistry>,
    instrumentation: Arc<RequestInstrumentation>,
    collector: Arc<PeriodicCollector>,
    cache: CacheClient,
    cache_metrics: Arc<CacheMetrics>,
}

impl OpsServer {
    /// Build every component. The cache backend is connected on first use.
    pub async fn build(config: ServerConfig) -> common::Result<Self> {
        let kv = RedisStore::open(&config.redis_url, config.redis_connect_timeout)?;
        Self::with_store(config, Arc::new(kv)).await
    }

    /// Build over an existing key-value backend
    pub async fn with_store(
        config: ServerConfig,
        kv: Arc<dyn cache::KvStore>,
    ) -> common::Result<Self> {
        let store = Arc::new(TimeSeriesStore::new(TimeSeriesConfig {
            max_samples_per_key: config.metrics_max_samples,
            retention: config.metrics_retention,
            max_series: config.metrics_max_series,
        }));
        let alerts = Arc::new(AlertLog::new(AlertLogConfig {
            max_alerts: config.alerts_max,
            retention: config.alerts_retention,
        }));

        let cache_metrics = Arc::new(CacheMetrics::new());
        let cache = CacheClient::new(kv)
            .with_default_ttl(config.cache_default_ttl)
            .with_metrics(cache_metrics.clone());

        let sampler: Arc<dyn ProcessSampler> =
            Arc::new(SystemSampler::new(config.memory_limit_bytes));

        let health = Arc::new(HealthCheckRegistry::with_mode(config.health_mode));
        health
            .register("cache", Arc::new(CacheProbe::new(cache.clone())))
            .await;
        health
            .register(
                "memory",
                Arc::new(MemoryProbe::new(
                    sampler.clone(),
                    config.memory_degraded_ratio,
                )),
            )
            .await;
        for spec in &config.health_checks {
            health.register(spec.name.clone(), build_check(spec)?).await;
            info!(check = %spec.name, "Registered configured health check");
        }

        let instrumentation = Arc::new(RequestInstrumentation::with_slow_threshold(
            store.clone(),
            alerts.clone(),
            config.slow_request_threshold,
        ));

        let collector = Arc::new(PeriodicCollector::new(
            store.clone(),
            alerts.clone(),
            sampler,
            CollectorConfig {
                interval: config.collector_interval,
                memory_alert_ratio: config.memory_alert_ratio,
                lag_alert_threshold: config.lag_alert_threshold,
            },
        ));

        Ok(Self {
            config,
            store,
            alerts,
            health,
            instrumentation,
            collector,
            cache,
            cache_metrics,
        })
    }

    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::with_ttl(self.cache.clone(), self.config.session_ttl)
    }

    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(self.cache.clone())
    }

    pub fn health(&self) -> &Arc<HealthCheckRegistry> {
        &self.health
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.store.clone(),
            self.alerts.clone(),
            self.health.clone(),
            self.instrumentation.clone(),
            self.cache_metrics.clone(),
        )
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> common::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `shutdown` resolves, then stop the background tasks
    pub async fn run_until<F>(self, shutdown: F) -> common::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        info!("Starting ops server");

        let tasks = vec![
            self.store.start_sweeper(self.config.metrics_sweep_interval),
            self.alerts.start_sweeper(self.config.alerts_sweep_interval),
            self.collector.start(),
        ];
        info!(tasks = tasks.len(), "Background tasks started");

        let server = HttpServer::new(self.app_state(), self.config.listen_addr);
        let result = server.run(shutdown).await;
        if let Err(ref e) = result {
            warn!(error = %e, "HTTP server error");
        }

        for task in tasks {
            let name = task.name();
            task.stop().await;
            info!(task = name, "Background task stopped");
        }

        info!("Ops server stopped");
        result
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
