//! Fixed-window rate limiting on backend counters.

use crate::client::CacheClient;
use crate::store::ttl_seconds;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

const KEY_PREFIX: &str = "rate:";

/// TTL reply for a key that exists without an expiry
const TTL_PERSISTENT: i64 = -1;

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u64,
}

/// Counts calls per key in fixed windows.
///
/// The window starts at the first call after expiry. A counter found with
/// no expiry, left by an EXPIRE that failed, gets its window reopened.
/// Correctness across processes rests on the backend's atomic INCR and EXPIRE.
pub struct RateLimiter {
    client: CacheClient,
}

impl RateLimiter {
    pub fn new(client: CacheClient) -> Self {
        Self { client }
    }

    /// Count one call against `key`. Fails open when the backend is
    /// unreachable.
    pub async fn check(&self, key: &str, limit: u64, window: Duration) -> RateLimitDecision {
        let counter = format!("{}{}", KEY_PREFIX, key);
        let store = self.client.store();

        let count = match store.incr(&counter, 1).await {
            Ok(count) => count,
            Err(e) => {
                warn!(key, error = %e, "Rate limiter backend failed, allowing request");
                self.record("failed_open");
                return RateLimitDecision {
                    allowed: true,
                    remaining: limit,
                };
            }
        };

        if count == 1 {
            self.open_window(key, &counter, window).await;
        } else if matches!(store.ttl(&counter).await, Ok(TTL_PERSISTENT)) {
            // The EXPIRE that opened this window never landed
            warn!(key, count, "Rate limit counter has no window, reopening");
            self.open_window(key, &counter, window).await;
        }

        let count = count.max(0) as u64;
        let allowed = count <= limit;
        self.record(if allowed { "allowed" } else { "rejected" });

        RateLimitDecision {
            allowed,
            remaining: limit.saturating_sub(count),
        }
    }

    async fn open_window(&self, key: &str, counter: &str, window: Duration) {
        match self.client.store().expire(counter, window).await {
            Ok(_) => debug!(key, window_secs = ttl_seconds(window), "Rate limit window opened"),
            Err(e) => warn!(key, error = %e, "Failed to set rate limit window"),
        }
    }

    fn record(&self, decision: &str) {
        if let Some(metrics) = self.client.metrics() {
            metrics.record_decision(decision);
        }
    }
}
