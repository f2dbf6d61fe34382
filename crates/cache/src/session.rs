//! Server-side session records.

use crate::client::CacheClient;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

const KEY_PREFIX: &str = "session:";

/// Default session lifetime
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

/// Sessions stored as JSON under `session:<id>`
pub struct SessionStore {
    client: CacheClient,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(client: CacheClient) -> Self {
        Self::with_ttl(client, DEFAULT_SESSION_TTL)
    }

    pub fn with_ttl(client: CacheClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    fn key(id: &str) -> String {
        format!("{}{}", KEY_PREFIX, id)
    }

    pub async fn save<T: Serialize + ?Sized>(&self, id: &str, session: &T) -> bool {
        self.client.set(&Self::key(id), session, Some(self.ttl)).await
    }

    pub async fn load<T: DeserializeOwned>(&self, id: &str) -> Option<T> {
        self.client.get(&Self::key(id)).await
    }

    /// Restart the session lifetime. False when the session is gone.
    pub async fn touch(&self, id: &str) -> bool {
        self.client.expire(&Self::key(id), self.ttl).await
    }

    pub async fn destroy(&self, id: &str) -> bool {
        self.client.del(&Self::key(id)).await
    }
}
