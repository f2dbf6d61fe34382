//! Typed publish/subscribe over the cache backend.

use crate::client::CacheClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Live subscription. The listener stops on `unsubscribe` or drop.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(channel: &str, handle: JoinHandle<()>) -> Self {
        Self {
            channel: channel.to_string(),
            handle,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the listener has stopped
    pub fn is_closed(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        debug!(channel = %self.channel, "Unsubscribing");
        self.handle.abort();
    }
}

/// JSON-typed channel
pub struct PubSub<T> {
    client: CacheClient,
    channel: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PubSub<T>
where
    T: Serialize + DeserializeOwned + Send + 'static,
{
    pub fn new(client: CacheClient, channel: impl Into<String>) -> Self {
        Self {
            client,
            channel: channel.into(),
            _marker: PhantomData,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Returns the number of receivers
    pub async fn publish(&self, message: &T) -> u64 {
        self.client.publish(&self.channel, message).await
    }

    /// Invoke `callback` with every message that parses as `T`. Messages
    /// that do not parse are logged and dropped.
    pub async fn subscribe<F>(&self, callback: F) -> Option<Subscription>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        let channel = self.channel.clone();
        self.client
            .subscribe(&self.channel, move |raw| match serde_json::from_str::<T>(&raw) {
                Ok(message) => callback(message),
                Err(e) => warn!(channel = %channel, error = %e, "Dropping unparsable message"),
            })
            .await
    }
}
