//! Counter store backends
//!
//! The throttler needs four operations from its backing store, mirroring the
//! Redis commands of the same names:
//!
//! - **Memory**: in-memory storage using DashMap (single instance, tests)
//! - **Redis**: shared storage for multi-instance deployments
//!
//! Every counter mutation goes through [`CounterStore::incr`], which must be
//! atomic. The throttler never reads a value, modifies it and writes it back.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;

use crate::error::ThrottleResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// TTL reported for a key that does not exist
pub const TTL_MISSING: i64 = -2;

/// TTL reported for a key that exists without an expiry
pub const TTL_PERSISTENT: i64 = -1;

/// Store type for throttling
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreType {
    /// In-memory store (single instance only)
    #[default]
    Memory,
    /// Redis store (distributed)
    Redis,
}

/// Shared counter store
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Current value stored under `key`, or `None` if unset
    async fn get(&self, key: &str) -> ThrottleResult<Option<String>>;

    /// Atomically increment `key` (created at 0 first) and return the new value
    async fn incr(&self, key: &str) -> ThrottleResult<i64>;

    /// Set the remaining lifetime of `key`; no-op if the key is absent
    async fn expire(&self, key: &str, seconds: u64) -> ThrottleResult<()>;

    /// Remaining lifetime of `key` in seconds
    ///
    /// Negative when no expiry is set ([`TTL_PERSISTENT`]) or the key does
    /// not exist ([`TTL_MISSING`]).
    async fn ttl(&self, key: &str) -> ThrottleResult<i64>;

    /// Get store type name for debugging
    fn store_type(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_type_default() {
        let store_type = StoreType::default();
        assert!(matches!(store_type, StoreType::Memory));
    }

    #[test]
    fn test_store_type_deserialize() {
        let store_type: StoreType = serde_json::from_str(r#""redis""#).unwrap();
        assert_eq!(store_type, StoreType::Redis);
    }
}
