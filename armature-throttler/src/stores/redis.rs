//! Redis counter store
//!
//! Uses Redis (or any protocol-compatible server such as Valkey) to share
//! throttle counters across multiple instances.
//! Requires the `redis` feature to be enabled.

use crate::error::ThrottleResult;
use crate::stores::CounterStore;
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

/// Default key prefix
pub const DEFAULT_PREFIX: &str = "throttle";

/// Redis-backed counter store
///
/// Commands map one to one onto `GET`, `INCR`, `EXPIRE` and `TTL`. Timeouts
/// and reconnects are left to the connection manager.
pub struct RedisStore {
    /// Redis connection manager
    conn: ConnectionManager,
    /// Key prefix
    prefix: String,
}

impl RedisStore {
    /// Create a new Redis store
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn new(url: &str) -> ThrottleResult<Self> {
        Self::with_prefix(url, DEFAULT_PREFIX).await
    }

    /// Create a new Redis store with a custom prefix
    pub async fn with_prefix(url: &str, prefix: impl Into<String>) -> ThrottleResult<Self> {
        debug!(url = %url, "Connecting to Redis for throttling");

        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    /// Wrap an existing connection manager
    pub fn from_connection(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    /// Get the full key with prefix
    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.prefix, suffix)
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn get(&self, key: &str) -> ThrottleResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.key(key)).await?;

        trace!(key = %key, value = ?value, "Redis GET");
        Ok(value)
    }

    async fn incr(&self, key: &str) -> ThrottleResult<i64> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(self.key(key), 1).await?;

        trace!(key = %key, count = count, "Redis INCR");
        Ok(count)
    }

    async fn expire(&self, key: &str, seconds: u64) -> ThrottleResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.expire(self.key(key), seconds as i64).await?;

        trace!(key = %key, seconds = seconds, "Redis EXPIRE");
        Ok(())
    }

    async fn ttl(&self, key: &str) -> ThrottleResult<i64> {
        let mut conn = self.conn.clone();
        let ttl: i64 = conn.ttl(self.key(key)).await?;

        trace!(key = %key, ttl = ttl, "Redis TTL");
        Ok(ttl)
    }

    fn store_type(&self) -> &'static str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
