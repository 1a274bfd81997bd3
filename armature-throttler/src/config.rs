//! Throttler configuration and builder

use crate::Throttler;
use crate::error::{ThrottleError, ThrottleResult};
use crate::extractor::{SharedTracker, TrackerExtractor};
use crate::policy::{PolicyOverride, ThrottlePolicy};
use crate::route::{RouteId, RouteRegistry};
use crate::stores::{CounterStore, MemoryStore, StoreType};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default prefix for store keys
pub const DEFAULT_KEY_PREFIX: &str = "throttle";

/// Configuration for the throttler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottlerConfig {
    /// Process-wide default policy
    #[serde(default)]
    pub default_policy: ThrottlePolicy,
    /// Store type (memory, redis)
    #[serde(default)]
    pub store_type: StoreType,
    /// Redis URL, required for the Redis store
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Namespace for Redis keys
    ///
    /// Applied by the Redis store built from this configuration. Engine keys
    /// stay bare, so the memory store and custom stores ignore it.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// Include `X-RateLimit-*` headers in allowed responses
    #[serde(default = "default_include_headers")]
    pub include_headers: bool,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

fn default_include_headers() -> bool {
    true
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            default_policy: ThrottlePolicy::default(),
            store_type: StoreType::Memory,
            redis_url: None,
            key_prefix: default_key_prefix(),
            include_headers: true,
        }
    }
}

impl ThrottlerConfig {
    /// Create a new configuration builder
    pub fn builder() -> ThrottlerBuilder {
        ThrottlerBuilder::new()
    }

    /// Load configuration from environment variables.
    ///
    /// - `THROTTLE_TTL`: window length in seconds
    /// - `THROTTLE_LIMIT`: requests per window
    /// - `THROTTLE_ERROR_MESSAGE`: message for rejected requests
    /// - `THROTTLE_COUNT_ALL`: `1`/`true` to count every request
    /// - `THROTTLE_KEY_PREFIX`: Redis key prefix
    /// - `REDIS_URL`: selects the Redis store
    ///
    /// Unparsable numbers are logged and the default is kept.
    pub fn from_env() -> ThrottlerBuilder {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ThrottlerBuilder {
        let mut builder = ThrottlerBuilder::new();

        if let Some(seconds) = parse_var(&lookup, "THROTTLE_TTL") {
            builder = builder.window_seconds(seconds);
        }

        if let Some(limit) = parse_var(&lookup, "THROTTLE_LIMIT") {
            builder = builder.limit(limit);
        }

        if let Some(message) = lookup("THROTTLE_ERROR_MESSAGE") {
            builder = builder.error_message(message);
        }

        if let Some(count_all) = lookup("THROTTLE_COUNT_ALL") {
            let count_all = count_all == "1" || count_all.eq_ignore_ascii_case("true");
            builder = builder.count_all_requests(count_all);
        }

        if let Some(prefix) = lookup("THROTTLE_KEY_PREFIX") {
            builder = builder.key_prefix(prefix);
        }

        if let Some(url) = lookup("REDIS_URL") {
            builder.config.store_type = StoreType::Redis;
            builder.config.redis_url = Some(url);
        }

        builder
    }
}

fn parse_var(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "Ignoring invalid throttle setting");
            None
        }
    }
}

/// Builder for creating a [`Throttler`]
pub struct ThrottlerBuilder {
    config: ThrottlerConfig,
    store: Option<Arc<dyn CounterStore>>,
    tracker: SharedTracker,
    routes: RouteRegistry,
}

impl ThrottlerBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: ThrottlerConfig::default(),
            store: None,
            tracker: SharedTracker::default(),
            routes: RouteRegistry::new(),
        }
    }

    /// Start from an existing configuration
    pub fn with_config(mut self, config: ThrottlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the default policy
    pub fn policy(mut self, policy: ThrottlePolicy) -> Self {
        self.config.default_policy = policy;
        self
    }

    /// Set the default window length in seconds
    pub fn window_seconds(mut self, seconds: u64) -> Self {
        self.config.default_policy.window_seconds = seconds;
        self
    }

    /// Set the default limit per window
    pub fn limit(mut self, limit: u64) -> Self {
        self.config.default_policy.limit = limit;
        self
    }

    /// Set the default error message
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.config.default_policy.error_message = Some(message.into());
        self
    }

    /// Count every request by default instead of successful ones only
    pub fn count_all_requests(mut self, count_all: bool) -> Self {
        self.config.default_policy.count_all_requests = count_all;
        self
    }

    /// Use in-memory store (default)
    pub fn memory_store(mut self) -> Self {
        self.config.store_type = StoreType::Memory;
        self.store = None;
        self
    }

    /// Use Redis store for distributed throttling
    #[cfg(feature = "redis")]
    pub fn redis_store(mut self, url: &str) -> Self {
        self.config.store_type = StoreType::Redis;
        self.config.redis_url = Some(url.to_string());
        self.store = None;
        self
    }

    /// Use an already constructed store
    pub fn store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the Redis key prefix
    ///
    /// Only the Redis store built by [`build`](Self::build) uses it.
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.key_prefix = prefix.into();
        self
    }

    /// Include `X-RateLimit-*` headers in allowed responses
    pub fn include_headers(mut self, include: bool) -> Self {
        self.config.include_headers = include;
        self
    }

    /// Derive trackers with a custom strategy
    pub fn tracker(mut self, extractor: impl TrackerExtractor + 'static) -> Self {
        self.tracker = SharedTracker::new(extractor);
        self
    }

    /// Attach a policy override to a route
    pub fn route(self, route: RouteId, policy: PolicyOverride) -> Self {
        self.routes.set_policy(route, policy);
        self
    }

    /// Never throttle a route
    pub fn skip_route(self, route: RouteId) -> Self {
        self.routes.skip(route);
        self
    }

    /// Build the throttler
    pub async fn build(self) -> ThrottleResult<Throttler> {
        self.config.default_policy.validate()?;

        debug!(
            policy = ?self.config.default_policy,
            store_type = ?self.config.store_type,
            tracker = self.tracker.description(),
            "Building throttler"
        );

        let store: Arc<dyn CounterStore> = match (self.store, &self.config.store_type) {
            (Some(store), _) => store,
            (None, StoreType::Memory) => Arc::new(MemoryStore::new()),
            #[cfg(feature = "redis")]
            (None, StoreType::Redis) => {
                let url = self.config.redis_url.as_deref().ok_or_else(|| {
                    ThrottleError::config("Redis URL must be specified for Redis store")
                })?;
                Arc::new(
                    crate::stores::RedisStore::with_prefix(url, self.config.key_prefix.clone())
                        .await?,
                )
            }
            #[cfg(not(feature = "redis"))]
            (None, StoreType::Redis) => {
                return Err(ThrottleError::config(
                    "Redis feature is not enabled. Add `redis` feature to use Redis store.",
                ));
            }
        };

        Ok(Throttler::new(store, self.config, self.routes, self.tracker))
    }
}

impl Default for ThrottlerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
