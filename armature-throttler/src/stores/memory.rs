//! In-memory counter store
//!
//! Uses DashMap for thread-safe concurrent access. Suitable for single-instance
//! deployments or testing. For distributed deployments, use the Redis store.
//!
//! Expiry is tracked with `tokio::time::Instant`, so tests running on a
//! paused runtime can move windows forward with `tokio::time::advance`.

use crate::error::ThrottleResult;
use crate::stores::{CounterStore, TTL_MISSING, TTL_PERSISTENT};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Counter with optional expiry
#[derive(Debug, Clone)]
struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory counter store
pub struct MemoryStore {
    counters: DashMap<String, CounterEntry>,
}

impl MemoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        debug!("Creating new in-memory throttle store");
        Self {
            counters: DashMap::new(),
        }
    }

    /// Get the number of tracked keys (for monitoring)
    pub fn key_count(&self) -> usize {
        self.counters.len()
    }

    /// Drop expired counters
    pub fn cleanup(&self) {
        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.counters.len());

        if removed > 0 {
            debug!(removed = removed, "Cleaned up expired throttle counters");
        }
    }

    /// Remove `key` if its TTL has elapsed
    fn evict_expired(&self, key: &str, now: Instant) {
        self.counters.remove_if(key, |_, entry| entry.is_expired(now));
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> ThrottleResult<Option<String>> {
        let now = Instant::now();
        self.evict_expired(key, now);

        let value = self.counters.get(key).map(|entry| entry.value.to_string());
        trace!(key = %key, value = ?value, "Memory get");
        Ok(value)
    }

    async fn incr(&self, key: &str) -> ThrottleResult<i64> {
        let now = Instant::now();
        self.evict_expired(key, now);

        let mut entry = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry {
                value: 0,
                expires_at: None,
            });
        entry.value += 1;

        trace!(key = %key, value = entry.value, "Memory incr");
        Ok(entry.value)
    }

    async fn expire(&self, key: &str, seconds: u64) -> ThrottleResult<()> {
        let now = Instant::now();
        self.evict_expired(key, now);

        if let Some(mut entry) = self.counters.get_mut(key) {
            entry.expires_at = Some(now + Duration::from_secs(seconds));
            trace!(key = %key, seconds = seconds, "Memory expire");
        }

        Ok(())
    }

    async fn ttl(&self, key: &str) -> ThrottleResult<i64> {
        let now = Instant::now();
        self.evict_expired(key, now);

        let ttl = match self.counters.get(key) {
            None => TTL_MISSING,
            Some(entry) => match entry.expires_at {
                None => TTL_PERSISTENT,
                // Rounded to the nearest second, as Redis reports it
                Some(at) => ((at.duration_since(now).as_millis() + 500) / 1000) as i64,
            },
        };

        trace!(key = %key, ttl = ttl, "Memory ttl");
        Ok(ttl)
    }

    fn store_type(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("keys", &self.counters.len())
            .finish()
    }
}
