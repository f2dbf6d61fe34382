//! Built-in health probes.

use crate::health::{HealthProbe, ProbeReport, ProbeResult};
use crate::sampler::ProcessSampler;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Reports whether a TCP connection can be opened to `target`
pub struct TcpProbe {
    target: SocketAddr,
    timeout_duration: Duration,
}

impl TcpProbe {
    pub fn new(target: SocketAddr, timeout_duration: Duration) -> Self {
        Self {
            target,
            timeout_duration,
        }
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn check(&self) -> ProbeResult {
        match timeout(self.timeout_duration, TcpStream::connect(self.target)).await {
            Ok(Ok(_stream)) => {
                debug!(target = %self.target, "TCP probe connected");
                Ok(ProbeReport::healthy().with_metadata("target", self.target.to_string()))
            }
            Ok(Err(e)) => {
                warn!(target = %self.target, error = %e, "TCP probe failed");
                Ok(ProbeReport::unhealthy(format!("Connection failed: {}", e)))
            }
            Err(_) => {
                warn!(target = %self.target, "TCP probe timed out");
                Ok(ProbeReport::unhealthy(format!(
                    "Connection timed out after {}ms",
                    self.timeout_duration.as_millis()
                )))
            }
        }
    }
}

/// Issues an HTTP request and checks the status code
pub struct HttpProbe {
    url: String,
    method: reqwest::Method,
    expected_codes: Vec<u16>,
    client: reqwest::Client,
}

impl HttpProbe {
    /// An empty `expected_codes` accepts any 2xx response.
    pub fn new(
        url: impl Into<String>,
        method: reqwest::Method,
        expected_codes: Vec<u16>,
        timeout_duration: Duration,
    ) -> common::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout_duration)
            .build()
            .map_err(|e| common::Error::healthcheck(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: url.into(),
            method,
            expected_codes,
            client,
        })
    }

    fn accepts(&self, code: u16) -> bool {
        if self.expected_codes.is_empty() {
            (200..300).contains(&code)
        } else {
            self.expected_codes.contains(&code)
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self) -> ProbeResult {
        let response = match self.client.request(self.method.clone(), &self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.url, error = %e, "HTTP probe failed");
                return Ok(ProbeReport::unhealthy(format!("HTTP request failed: {}", e)));
            }
        };

        let code = response.status().as_u16();
        if self.accepts(code) {
            debug!(url = %self.url, status = code, "HTTP probe succeeded");
            Ok(ProbeReport::healthy().with_metadata("statusCode", code))
        } else {
            warn!(url = %self.url, status = code, "HTTP probe got unexpected status");
            Ok(ProbeReport::unhealthy(format!("Unexpected status code: {}", code))
                .with_metadata("statusCode", code))
        }
    }
}

/// Degraded when process memory crosses `degraded_ratio` of its budget
pub struct MemoryProbe {
    sampler: Arc<dyn ProcessSampler>,
    degraded_ratio: f64,
}

impl MemoryProbe {
    pub fn new(sampler: Arc<dyn ProcessSampler>, degraded_ratio: f64) -> Self {
        Self {
            sampler,
            degraded_ratio,
        }
    }
}

#[async_trait]
impl HealthProbe for MemoryProbe {
    async fn check(&self) -> ProbeResult {
        let memory = self.sampler.memory();
        let ratio = memory.heap_ratio();
        let percent = (ratio * 1000.0).round() / 10.0;

        let report = if ratio > self.degraded_ratio {
            ProbeReport::degraded(format!("Memory usage at {:.1}%", percent))
        } else {
            ProbeReport::healthy()
        };

        Ok(report
            .with_metadata("heapUsed", memory.heap_used)
            .with_metadata("heapTotal", memory.heap_total)
            .with_metadata("usagePercent", percent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::{CpuUsage, MemoryUsage};
    use crate::types::HealthStatus;
    use tokio::net::TcpListener;

    struct FixedMemory(u64, u64);

    impl ProcessSampler for FixedMemory {
        fn memory(&self) -> MemoryUsage {
            MemoryUsage {
                rss: self.0,
                heap_used: self.0,
                heap_total: self.1,
                external: 0,
            }
        }

        fn cpu(&self) -> CpuUsage {
            CpuUsage::default()
        }
    }

    #[tokio::test]
    async fn test_tcp_probe_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpProbe::new(addr, Duration::from_millis(500));
        let report = probe.check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let probe = TcpProbe::new(addr, Duration::from_millis(500));
        let report = probe.check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn test_http_probe_unreachable() {
        let probe = HttpProbe::new(
            "http://127.0.0.1:1/health",
            reqwest::Method::GET,
            vec![200],
            Duration::from_millis(200),
        )
        .unwrap();

        let report = probe.check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[test]
    fn test_http_probe_status_acceptance() {
        let any_2xx = HttpProbe::new("http://localhost", reqwest::Method::GET, vec![], Duration::from_secs(1)).unwrap();
        assert!(any_2xx.accepts(204));
        assert!(!any_2xx.accepts(301));

        let explicit = HttpProbe::new("http://localhost", reqwest::Method::GET, vec![200, 301], Duration::from_secs(1)).unwrap();
        assert!(explicit.accepts(301));
        assert!(!explicit.accepts(204));
    }

    #[tokio::test]
    async fn test_memory_probe_degrades_above_ratio() {
        let probe = MemoryProbe::new(Arc::new(FixedMemory(95, 100)), 0.9);
        let report = probe.check().await.unwrap();
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.metadata.unwrap()["usagePercent"], 95.0);

        let probe = MemoryProbe::new(Arc::new(FixedMemory(40, 100)), 0.9);
        assert_eq!(probe.check().await.unwrap().status, HealthStatus::Healthy);
    }
}
