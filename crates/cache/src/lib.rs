//! Cache, rate limiting and pub/sub over a remote key-value store.
//!
//! Every operation goes through [`CacheClient`], which turns backend
//! failures into logged misses so callers keep serving when the store is
//! down. Backends implement [`KvStore`]:
//! - [`RedisStore`] for production
//! - [`MemoryStore`] for tests and local development

pub mod aside;
pub mod client;
pub mod memory_store;
pub mod metrics;
pub mod pubsub;
pub mod rate_limit;
pub mod redis_store;
pub mod session;
pub mod store;

pub use aside::CacheAside;
pub use client::{CacheClient, DEFAULT_TTL, TTL_MISSING};
pub use memory_store::MemoryStore;
pub use metrics::CacheMetrics;
pub use pubsub::{PubSub, Subscription};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use redis_store::RedisStore;
pub use session::{DEFAULT_SESSION_TTL, SessionStore};
pub use store::{KvStore, StoreError, StoreResult};
