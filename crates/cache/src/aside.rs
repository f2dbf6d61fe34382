//! Cache-aside lookups with an optional single-flight guard.

use crate::client::CacheClient;
use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Read-through helper: serve from cache, otherwise compute and populate.
///
/// Without single-flight, concurrent misses on one key each run `compute`.
pub struct CacheAside {
    client: CacheClient,
    in_flight: Option<DashMap<String, Arc<Mutex<()>>>>,
}

impl CacheAside {
    pub fn new(client: CacheClient) -> Self {
        Self {
            client,
            in_flight: None,
        }
    }

    /// Serialise concurrent misses per key so `compute` runs once
    pub fn with_single_flight(mut self) -> Self {
        self.in_flight = Some(DashMap::new());
        self
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    /// Return the cached value for `key`, or run `compute`, store its result
    /// and return it. Errors from `compute` are returned unchanged and
    /// nothing is cached. A failed cache write still returns the value.
    pub async fn resolve<T, E, F, Fut>(&self, key: &str, compute: F, ttl: Option<Duration>) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(key).await {
            return Ok(value);
        }

        let Some(in_flight) = &self.in_flight else {
            return self.compute_and_store(key, compute, ttl).await;
        };

        let lock = in_flight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            match self.lookup(key).await {
                Some(value) => Ok(value),
                None => self.compute_and_store(key, compute, ttl).await,
            }
        };

        drop(lock);
        in_flight.remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.client.get(key).await;
        if let Some(metrics) = self.client.metrics() {
            metrics.record_lookup(if value.is_some() { "hit" } else { "miss" });
        }
        if value.is_some() {
            debug!(key, "Cache-aside hit");
        }
        value
    }

    async fn compute_and_store<T, E, F, Fut>(&self, key: &str, compute: F, ttl: Option<Duration>) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                if let Some(metrics) = self.client.metrics() {
                    metrics.record_lookup("compute_error");
                }
                return Err(e);
            }
        };

        if !self.client.set(key, &value, ttl).await {
            warn!(key, "Computed value could not be cached");
        }
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use crate::store::{MockKvStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn aside() -> CacheAside {
        CacheAside::new(CacheClient::new(Arc::new(MemoryStore::new())))
    }

    #[tokio::test]
    async fn test_miss_computes_then_hits() {
        let aside = aside();
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<u32, String> = aside
                .resolve(
                    "answer",
                    || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(42)
                    },
                    None,
                )
                .await;
            assert_eq!(value, Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_compute_error_propagates_and_is_not_cached() {
        let aside = aside();
        let value: Result<u32, String> = aside
            .resolve("k", || async { Err("db down".to_string()) }, None)
            .await;
        assert_eq!(value, Err("db down".to_string()));
        assert!(!aside.client().exists("k").await);
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_value() {
        let mut store = MockKvStore::new();
        store.expect_get().returning(|_| Ok(None));
        store
            .expect_set()
            .returning(|_, _, _| Err(StoreError::Unavailable("down".into())));

        let aside = CacheAside::new(CacheClient::new(Arc::new(store)));
        let resolved = aside
            .resolve("k", || async { Ok::<String, ()>("fresh".to_string()) }, None)
            .await;
        assert_eq!(resolved, Ok("fresh".to_string()));
    }

    #[tokio::test]
    async fn test_without_single_flight_concurrent_misses_all_compute() {
        let aside = aside();
        let calls = AtomicUsize::new(0);
        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<u32, ()>(1)
        };

        let (a, b) = tokio::join!(aside.resolve("k", compute, None), aside.resolve("k", compute, None));
        assert_eq!((a, b), (Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_coalesces_concurrent_misses() {
        let aside = aside().with_single_flight();
        let calls = AtomicUsize::new(0);
        let compute = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<u32, ()>(1)
        };

        let (a, b) = tokio::join!(aside.resolve("k", compute, None), aside.resolve("k", compute, None));
        assert_eq!((a, b), (Ok(1), Ok(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(aside.in_flight.as_ref().unwrap().is_empty());
    }
}
