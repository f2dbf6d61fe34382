//! JSON cache client that never fails its callers.

use crate::metrics::CacheMetrics;
use crate::pubsub::Subscription;
use crate::store::{KvStore, StoreResult};
use futures::StreamExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Default TTL applied when `set` is called without one
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// Returned by `ttl` when the key is missing or the backend failed
pub const TTL_MISSING: i64 = -2;

/// Typed facade over a [`KvStore`].
///
/// Backend failures are logged and turned into safe defaults: `None`,
/// `false`, `0`, empty lists, and [`TTL_MISSING`] for `ttl`. Values that do
/// not deserialize into the requested type are treated as misses.
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KvStore>,
    default_ttl: Duration,
    metrics: Option<Arc<CacheMetrics>>,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            default_ttl: DEFAULT_TTL,
            metrics: None,
        }
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<CacheMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn metrics(&self) -> Option<&Arc<CacheMetrics>> {
        self.metrics.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    fn record(&self, operation: &str, outcome: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(operation, outcome);
        }
    }

    fn settle<T>(&self, operation: &str, key: &str, result: StoreResult<T>, fallback: T) -> T {
        match result {
            Ok(value) => {
                self.record(operation, "ok");
                value
            }
            Err(e) => {
                error!(operation, key, error = %e, "Cache operation failed");
                self.record(operation, "error");
                fallback
            }
        }
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Cached value did not deserialize, treating as miss");
                None
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.store.get(key).await {
            Ok(Some(raw)) => {
                let value = self.decode(key, &raw);
                self.record("get", if value.is_some() { "hit" } else { "miss" });
                value
            }
            Ok(None) => {
                debug!(key, "Cache miss");
                self.record("get", "miss");
                None
            }
            Err(e) => {
                error!(operation = "get", key, error = %e, "Cache operation failed");
                self.record("get", "error");
                None
            }
        }
    }

    /// Store `value` as JSON. `None` applies the default TTL.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                error!(key, error = %e, "Failed to serialize cache value");
                self.record("set", "error");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        let result = self.store.set(key, raw, Some(ttl)).await.map(|_| true);
        self.settle("set", key, result, false)
    }

    pub async fn del(&self, key: &str) -> bool {
        let result = self.store.del(key).await;
        self.settle("del", key, result, false)
    }

    pub async fn exists(&self, key: &str) -> bool {
        let result = self.store.exists(key).await;
        self.settle("exists", key, result, false)
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        let result = self.store.keys(pattern).await;
        self.settle("keys", pattern, result, Vec::new())
    }

    /// Values in key order. Misses and undecodable values are `None`.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let result = self.store.mget(keys).await;
        let raw = self.settle("mget", &keys.join(","), result, Vec::new());
        raw.into_iter()
            .zip(keys)
            .map(|(value, key)| value.and_then(|raw| self.decode(key, &raw)))
            .collect()
    }

    /// Write all entries in one atomic batch
    pub async fn mset<T: Serialize>(&self, entries: &[(String, T)], ttl: Option<Duration>) -> bool {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::to_string(value) {
                Ok(raw) => encoded.push((key.clone(), raw)),
                Err(e) => {
                    error!(key = %key, error = %e, "Failed to serialize cache value");
                    self.record("mset", "error");
                    return false;
                }
            }
        }
        let count = encoded.len();
        let ttl = ttl.unwrap_or(self.default_ttl);
        let result = self.store.mset(encoded, Some(ttl)).await.map(|_| true);
        let ok = self.settle("mset", "", result, false);
        if ok {
            debug!(count, "Cache batch written");
        }
        ok
    }

    /// Add `amount` and return the new value, or 0 on failure
    pub async fn increment(&self, key: &str, amount: i64) -> i64 {
        let result = self.store.incr(key, amount).await;
        self.settle("increment", key, result, 0)
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let result = self.store.expire(key, ttl).await;
        self.settle("expire", key, result, false)
    }

    /// Remaining seconds, `-1` without expiry, [`TTL_MISSING`] when absent
    pub async fn ttl(&self, key: &str) -> i64 {
        let result = self.store.ttl(key).await;
        self.settle("ttl", key, result, TTL_MISSING)
    }

    /// Publish a JSON message. Returns the number of receivers.
    pub async fn publish<T: Serialize + ?Sized>(&self, channel: &str, message: &T) -> u64 {
        let raw = match serde_json::to_string(message) {
            Ok(raw) => raw,
            Err(e) => {
                error!(channel, error = %e, "Failed to serialize message");
                return 0;
            }
        };
        let result = self.store.publish(channel, raw).await;
        self.settle("publish", channel, result, 0)
    }

    /// Invoke `callback` with each raw message on `channel` until the
    /// returned handle is dropped. `None` when the subscription could not be
    /// opened.
    pub async fn subscribe<F>(&self, channel: &str, callback: F) -> Option<Subscription>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut stream = match self.store.subscribe(channel).await {
            Ok(stream) => stream,
            Err(e) => {
                error!(channel, error = %e, "Failed to subscribe");
                self.record("subscribe", "error");
                return None;
            }
        };
        self.record("subscribe", "ok");

        let name = channel.to_string();
        let handle = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                callback(message);
            }
            debug!(channel = %name, "Subscription stream ended");
        });
        Some(Subscription::new(channel, handle))
    }

    pub async fn ping(&self) -> bool {
        let result = self.store.ping().await.map(|_| true);
        self.settle("ping", "", result, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::{MockKvStore, StoreError};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    fn failing_store() -> MockKvStore {
        let down = || StoreError::Unavailable("connection refused".into());
        let mut store = MockKvStore::new();
        store.expect_get().returning(move |_| Err(down()));
        store.expect_set().returning(move |_, _, _| Err(down()));
        store.expect_del().returning(move |_| Err(down()));
        store.expect_exists().returning(move |_| Err(down()));
        store.expect_keys().returning(move |_| Err(down()));
        store.expect_mget().returning(move |_| Err(down()));
        store.expect_mset().returning(move |_, _| Err(down()));
        store.expect_incr().returning(move |_, _| Err(down()));
        store.expect_expire().returning(move |_, _| Err(down()));
        store.expect_ttl().returning(move |_| Err(down()));
        store.expect_publish().returning(move |_, _| Err(down()));
        store.expect_subscribe().returning(move |_| Err(down()));
        store.expect_ping().returning(move || Err(down()));
        store
    }

    #[tokio::test]
    async fn test_backend_failure_returns_safe_defaults() {
        let metrics = Arc::new(CacheMetrics::new());
        let client = CacheClient::new(Arc::new(failing_store())).with_metrics(metrics.clone());

        assert_eq!(client.get::<User>("u").await, None);
        assert!(!client.set("u", &1, None).await);
        assert!(!client.del("u").await);
        assert!(!client.exists("u").await);
        assert!(client.keys("*").await.is_empty());
        assert!(client.mget::<u32>(&["a".into()]).await.is_empty());
        assert!(!client.mset(&[("a".to_string(), 1)], None).await);
        assert_eq!(client.increment("n", 1).await, 0);
        assert!(!client.expire("u", Duration::from_secs(1)).await);
        assert_eq!(client.ttl("u").await, TTL_MISSING);
        assert_eq!(client.publish("c", "m").await, 0);
        assert!(client.subscribe("c", |_| {}).await.is_none());
        assert!(!client.ping().await);

        assert_eq!(metrics.operation_count("get", "error"), 1);
        assert_eq!(metrics.operation_count("ttl", "error"), 1);
    }

    #[tokio::test]
    async fn test_set_applies_default_ttl() {
        let mut store = MockKvStore::new();
        store
            .expect_set()
            .withf(|key, value, ttl| key == "k" && value == "{\"id\":1,\"name\":\"a\"}" && *ttl == Some(Duration::from_secs(30)))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let client = CacheClient::new(Arc::new(store)).with_default_ttl(Duration::from_secs(30));
        assert!(client.set("k", &User { id: 1, name: "a".into() }, None).await);
    }

    #[tokio::test]
    async fn test_json_round_trip_and_decode_miss() {
        let store = Arc::new(MemoryStore::new());
        let client = CacheClient::new(store.clone());
        let user = User { id: 7, name: "ada".into() };

        assert!(client.set("user:7", &user, None).await);
        assert_eq!(client.get::<User>("user:7").await, Some(user));

        store.set("broken", "not json".into(), None).await.unwrap();
        assert_eq!(client.get::<User>("broken").await, None);
        assert!(client.exists("broken").await);
    }

    #[tokio::test]
    async fn test_mget_preserves_key_order() {
        let client = CacheClient::new(Arc::new(MemoryStore::new()));
        client
            .mset(&[("a".to_string(), 1u32), ("c".to_string(), 3u32)], None)
            .await;

        let values: Vec<Option<u32>> = client
            .mget(&["c".to_string(), "b".to_string(), "a".to_string()])
            .await;
        assert_eq!(values, vec![Some(3), None, Some(1)]);
    }

    #[tokio::test]
    async fn test_increment_and_ttl() {
        let client = CacheClient::new(Arc::new(MemoryStore::new()));
        assert_eq!(client.increment("hits", 2).await, 2);
        assert_eq!(client.increment("hits", 3).await, 5);
        assert_eq!(client.ttl("hits").await, -1);
        assert_eq!(client.ttl("nope").await, TTL_MISSING);
    }
}
