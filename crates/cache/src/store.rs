//! Key-value backend seam.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::time::Duration;

/// Backend error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("command failed: {0}")]
    Command(String),

    #[error("value is not an integer or out of range")]
    NotAnInteger,
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Command(e.to_string())
        }
    }
}

impl From<StoreError> for common::Error {
    fn from(e: StoreError) -> Self {
        common::Error::cache(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// TTL in whole seconds, rounded up, never below one
pub fn ttl_seconds(ttl: Duration) -> u64 {
    let millis = ttl.as_millis();
    (millis.div_ceil(1000) as u64).max(1)
}

/// Asynchronous string key-value store with TTLs and pub/sub.
///
/// `ttl` follows the Redis convention: `-2` for a missing key, `-1` for a
/// key without expiry, remaining seconds otherwise.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;

    /// Returns whether the key existed
    async fn del(&self, key: &str) -> StoreResult<bool>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Keys matching a glob pattern (`*`, `?`)
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>>;

    /// Write all entries as one atomic batch
    async fn mset(&self, entries: Vec<(String, String)>, ttl: Option<Duration>) -> StoreResult<()>;

    /// Atomically add `amount`, creating the key at 0. Returns the new value.
    async fn incr(&self, key: &str, amount: i64) -> StoreResult<i64>;

    /// Returns false when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// Returns the number of receivers
    async fn publish(&self, channel: &str, message: String) -> StoreResult<u64>;

    /// Open a dedicated subscription to `channel`
    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>>;

    async fn ping(&self) -> StoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_seconds_rounds_up() {
        assert_eq!(ttl_seconds(Duration::from_millis(60_000)), 60);
        assert_eq!(ttl_seconds(Duration::from_millis(60_001)), 61);
        assert_eq!(ttl_seconds(Duration::from_millis(1)), 1);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    #[test]
    fn test_store_error_into_common() {
        let err: common::Error = StoreError::Unavailable("refused".into()).into();
        assert_eq!(err.to_string(), "Cache error: backend unavailable: refused");
    }
}
