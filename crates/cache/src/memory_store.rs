//! In-process backend for tests and development.

use crate::store::{KvStore, StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// TTL-aware map with broadcast pub/sub. Expired keys are dropped lazily on
/// access.
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
    channels: DashMap<String, broadcast::Sender<String>>,
    channel_capacity: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(channel_capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            channels: DashMap::new(),
            channel_capacity: channel_capacity.max(1),
        }
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        let value = self.entries.get(key).map(|e| (e.is_expired(now), e.value.clone()));
        match value {
            Some((false, value)) => Some(value),
            Some((true, _)) => {
                self.entries.remove_if(key, |_, e| e.is_expired(now));
                None
            }
            None => None,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, e)| !e.is_expired(now)))
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.live_value(key).is_some())
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| !e.value().is_expired(now) && glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        Ok(keys.iter().map(|k| self.live_value(k)).collect())
    }

    async fn mset(&self, entries: Vec<(String, String)>, ttl: Option<Duration>) -> StoreResult<()> {
        for (key, value) in entries {
            self.entries.insert(key, Entry::new(value, ttl));
        }
        Ok(())
    }

    async fn incr(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert_with(|| Entry::new("0".into(), None));
        if entry.is_expired(now) {
            *entry = Entry::new("0".into(), None);
        }

        let current: i64 = entry.value.parse().map_err(|_| StoreError::NotAnInteger)?;
        let next = current.checked_add(amount).ok_or(StoreError::NotAnInteger)?;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        if self.live_value(key).is_none() {
            return Ok(false);
        }
        match self.entries.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        if self.live_value(key).is_none() {
            return Ok(-2);
        }
        let now = Instant::now();
        Ok(match self.entries.get(key).and_then(|e| e.expires_at) {
            Some(at) => {
                let remaining = at.saturating_duration_since(now).as_millis();
                ((remaining + 500) / 1000) as i64
            }
            None => -1,
        })
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<u64> {
        let Some(sender) = self.channels.get(channel).map(|s| s.clone()) else {
            return Ok(0);
        };
        Ok(sender.send(message).map(|n| n as u64).unwrap_or(0))
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
        let receiver = self
            .channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
            .subscribe();
        debug!(channel, "Subscribed");

        let channel = channel.to_string();
        let stream = stream::unfold(receiver, move |mut receiver| {
            let channel = channel.clone();
            async move {
                loop {
                    match receiver.recv().await {
                        Ok(message) => return Some((message, receiver)),
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Subscriber lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Redis-style glob over `*` and `?`
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some('?') => {
                p += 1;
                t += 1;
            }
            Some(c) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star_p, star_t)) => {
                    p = star_p + 1;
                    t = star_t + 1;
                    backtrack = Some((star_p, star_t + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|c| *c == '*')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("user:*", "user:42"));
        assert!(!glob_match("user:*", "session:42"));
        assert!(glob_match("rate:?", "rate:a"));
        assert!(!glob_match("rate:?", "rate:ab"));
        assert!(glob_match("*:cache:*", "app:cache:item"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), 10);

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.ttl("k").await.unwrap(), -2);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_ttl_without_expiry() {
        let store = MemoryStore::new();
        store.set("k", "v".into(), None).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), -1);
        assert!(store.expire("k", Duration::from_secs(5)).await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), 5);
        assert!(!store.expire("missing", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_incr_counts_and_rejects_text() {
        let store = MemoryStore::new();
        assert_eq!(store.incr("n", 1).await.unwrap(), 1);
        assert_eq!(store.incr("n", 5).await.unwrap(), 6);

        store.set("s", "abc".into(), None).await.unwrap();
        assert_eq!(store.incr("s", 1).await, Err(StoreError::NotAnInteger));
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_ttl() {
        let store = MemoryStore::new();
        store.incr("n", 1).await.unwrap();
        store.expire("n", Duration::from_secs(60)).await.unwrap();
        store.incr("n", 1).await.unwrap();
        assert_eq!(store.ttl("n").await.unwrap(), 60);
    }

    #[tokio::test]
    async fn test_keys_and_mget() {
        let store = MemoryStore::new();
        store
            .mset(
                vec![
                    ("user:1".into(), "a".into()),
                    ("user:2".into(), "b".into()),
                    ("other".into(), "c".into()),
                ],
                None,
            )
            .await
            .unwrap();

        assert_eq!(store.keys("user:*").await.unwrap(), vec!["user:1", "user:2"]);
        let values = store
            .mget(&["user:2".into(), "missing".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("b".to_string()), None]);
        assert!(store.del("other").await.unwrap());
        assert!(!store.del("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let store = MemoryStore::new();
        assert_eq!(store.publish("events", "lost".into()).await.unwrap(), 0);

        let mut stream = store.subscribe("events").await.unwrap();
        assert_eq!(store.publish("events", "hello".into()).await.unwrap(), 1);
        assert_eq!(stream.next().await.as_deref(), Some("hello"));
    }
}
