//! Redis backend.

use crate::store::{KvStore, StoreResult, ttl_seconds};
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Redis-backed store.
///
/// The multiplexed connection is opened on first use, so a server that is
/// down at startup only turns the first calls into misses. Each subscription
/// opens its own pub/sub connection.
pub struct RedisStore {
    client: redis::Client,
    manager: OnceCell<ConnectionManager>,
    connect_timeout: Duration,
}

impl RedisStore {
    /// Parse the URL without connecting
    pub fn open(url: &str, connect_timeout: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            manager: OnceCell::new(),
            connect_timeout,
        })
    }

    async fn connection(&self) -> StoreResult<ConnectionManager> {
        let manager = self
            .manager
            .get_or_try_init(|| async {
                let config = ConnectionManagerConfig::new()
                    .set_connection_timeout(self.connect_timeout)
                    .set_number_of_retries(1);
                match ConnectionManager::new_with_config(self.client.clone(), config).await {
                    Ok(manager) => {
                        info!("Connected to Redis");
                        Ok(manager)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis connection failed");
                        Err(e)
                    }
                }
            })
            .await?;
        Ok(manager.clone())
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("EX").arg(ttl_seconds(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let removed: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = redis::cmd("KEYS").arg(pattern).query_async(&mut conn).await?;
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<String>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.connection().await?;
        let values: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;
        Ok(values)
    }

    async fn mset(&self, entries: Vec<(String, String)>, ttl: Option<Duration>) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.connection().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in &entries {
            let cmd = pipe.cmd("SET").arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("EX").arg(ttl_seconds(ttl));
            }
            cmd.ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        debug!(count = entries.len(), "Pipelined MSET");
        Ok(())
    }

    async fn incr(&self, key: &str, amount: i64) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let value: i64 = redis::cmd("INCRBY").arg(key).arg(amount).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection().await?;
        let set: i64 = redis::cmd("EXPIRE")
            .arg(key)
            .arg(ttl_seconds(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(set == 1)
    }

    async fn ttl(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection().await?;
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok(ttl)
    }

    async fn publish(&self, channel: &str, message: String) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let receivers: u64 = redis::cmd("PUBLISH")
            .arg(channel)
            .arg(message)
            .query_async(&mut conn)
            .await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> StoreResult<BoxStream<'static, String>> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        debug!(channel, "Subscribed");

        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                match msg.get_payload::<String>() {
                    Ok(payload) => Some(payload),
                    Err(e) => {
                        warn!(channel = msg.get_channel_name(), error = %e, "Dropping non-text message");
                        None
                    }
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
