//! # Armature Throttler
//!
//! Route throttling for the Armature framework. Counters live in a shared
//! store (Redis, Valkey, or in-memory for a single instance), so every
//! instance behind a load balancer enforces the same limits.
//!
//! ## Features
//!
//! - **Fixed windows**: a counter per caller and route, expiring after the window
//! - **Two counting modes**: count every request, or successful ones only
//! - **Per-route policies**: override window, limit, message and mode per handler
//! - **Pluggable trackers**: by IP (default), by header, or any closure
//! - **Standard headers**: `X-RateLimit-Limit`, `X-RateLimit-Remaining`,
//!   `X-RateLimit-Reset` and `Retry-After`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use armature_throttler::{RequestInfo, RouteId, Throttler};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let throttler = Throttler::builder()
//!     .window_seconds(60)
//!     .limit(100)
//!     .count_all_requests(true)
//!     .build()
//!     .await?;
//!
//! let route = RouteId::new("UsersController", "list");
//! let decision = throttler.decide(&route, &RequestInfo::new()).await?;
//! if let Some(headers) = decision.headers() {
//!     println!("{} requests left", headers.remaining.unwrap_or(0));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Request lifecycle
//!
//! 1. **Decision** runs before the handler. It resolves the route's policy,
//!    derives the key, reads the window TTL and either increments the counter
//!    (count-all mode) or reads it (success-only mode), then allows or rejects.
//! 2. **Settlement** runs after the handler, in success-only mode only. A
//!    response below 400 increments the counter; failures never count.
//!
//! [`ThrottlerInterceptor`] wires both stages around a handler and runs the
//! settlement on a detached task.

pub mod config;
pub mod error;
pub mod extractor;
pub mod interceptor;
pub mod key;
pub mod policy;
pub mod route;
pub mod stores;

pub use config::{ThrottlerBuilder, ThrottlerConfig};
pub use error::{RateLimitHeaders, ThrottleError, ThrottleResult};
pub use extractor::{HeaderTracker, IpTracker, RequestInfo, SharedTracker, TrackerExtractor};
pub use interceptor::{ExecutionContext, HttpResponse, InterceptError, Next, ThrottlerInterceptor};
pub use key::ThrottleKey;
pub use policy::{EffectivePolicy, PolicyOverride, ThrottlePolicy};
pub use route::{RouteId, RouteRegistry, RouteThrottle};
pub use stores::{CounterStore, MemoryStore, StoreType};

#[cfg(feature = "redis")]
pub use stores::RedisStore;

use http::StatusCode;
use std::sync::Arc;
use tokio::task::JoinHandle;
use crate::stores::TTL_PERSISTENT;
use tracing::{debug, error, info, trace, warn};

/// Request-scoped state carried from the decision stage to the settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThrottleBinding {
    /// Limiting key computed for this request
    pub key: ThrottleKey,
    /// Policy resolved for this request
    pub policy: EffectivePolicy,
}

/// Outcome of an allowed decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The route bypasses throttling; the store was not touched
    Bypassed,
    /// The request may proceed
    Allowed {
        /// Attributes to set on the response, if headers are enabled
        headers: Option<RateLimitHeaders>,
        /// State for the settlement stage
        binding: ThrottleBinding,
    },
}

impl Decision {
    /// Binding for the settlement stage, absent on bypassed routes
    pub fn binding(&self) -> Option<&ThrottleBinding> {
        match self {
            Self::Allowed { binding, .. } => Some(binding),
            Self::Bypassed => None,
        }
    }

    /// Response attributes, if any
    pub fn headers(&self) -> Option<&RateLimitHeaders> {
        match self {
            Self::Allowed { headers, .. } => headers.as_ref(),
            Self::Bypassed => None,
        }
    }

    /// Consume the decision, keeping the binding
    pub fn into_binding(self) -> Option<ThrottleBinding> {
        match self {
            Self::Allowed { binding, .. } => Some(binding),
            Self::Bypassed => None,
        }
    }

    /// Whether throttling was bypassed
    pub fn is_bypassed(&self) -> bool {
        matches!(self, Self::Bypassed)
    }
}

/// Whether a handler status counts as a success for settlement
pub fn is_success_status(status: u16) -> bool {
    status < StatusCode::BAD_REQUEST.as_u16()
}

/// The throttling engine
pub struct Throttler {
    store: Arc<dyn CounterStore>,
    config: ThrottlerConfig,
    routes: RouteRegistry,
    tracker: SharedTracker,
}

impl Throttler {
    /// Create a new throttler builder
    pub fn builder() -> ThrottlerBuilder {
        ThrottlerBuilder::new()
    }

    /// Create a throttler from its parts
    pub fn new(
        store: Arc<dyn CounterStore>,
        config: ThrottlerConfig,
        routes: RouteRegistry,
        tracker: SharedTracker,
    ) -> Self {
        debug!(
            store = store.store_type(),
            routes = routes.len(),
            "Creating new throttler"
        );
        Self {
            store,
            config,
            routes,
            tracker,
        }
    }

    /// Resolve the effective policy for a route
    pub fn resolve_policy(&self, route: &RouteId) -> EffectivePolicy {
        self.config
            .default_policy
            .resolve(self.routes.policy(route).as_ref())
    }

    /// Decision stage: decide whether a request on `route` may proceed
    ///
    /// # Errors
    ///
    /// - [`ThrottleError::LimitExceeded`] when the caller is over the limit
    /// - a store error when the counter store fails; there is no fallback
    pub async fn decide(&self, route: &RouteId, request: &RequestInfo) -> ThrottleResult<Decision> {
        if self.routes.is_skipped(route) {
            trace!(route = %route, "Route bypasses throttling");
            return Ok(Decision::Bypassed);
        }

        let policy = self.resolve_policy(route);
        let tracker = self.tracker.tracker(request);
        let key = ThrottleKey::derive(route, &tracker);

        trace!(route = %route, key = %key, policy = %policy.description(), "Checking throttle");

        let ttl = self.store.ttl(key.as_str()).await?;
        if ttl == TTL_PERSISTENT {
            // A counter without expiry would never reset; restart its window
            warn!(key = %key, "Counter has no expiry, restarting window");
            self.store.expire(key.as_str(), policy.window_seconds).await?;
        }
        // No expiry yet: the window is starting now
        let reset = u64::try_from(ttl).unwrap_or(policy.window_seconds);

        let count = if policy.count_all_requests {
            self.increment(&key, policy.window_seconds).await?
        } else {
            self.current_count(&key).await?
        };

        if policy.exceeded_by(count) {
            info!(
                route = %route,
                key = %key,
                count = count,
                retry_after = reset,
                "Throttle limit exceeded"
            );
            return Err(ThrottleError::limit_exceeded(policy.error_message, reset));
        }

        let remaining = policy.remaining(count);
        debug!(route = %route, key = %key, remaining = remaining, "Request allowed");

        let headers = self
            .config
            .include_headers
            .then(|| RateLimitHeaders::allowed(policy.limit, remaining, reset));

        Ok(Decision::Allowed {
            headers,
            binding: ThrottleBinding { key, policy },
        })
    }

    /// Settlement stage: count a finished request in success-only mode
    ///
    /// Returns whether the counter was incremented. Count-all policies and
    /// error statuses (400 and above) leave the counter alone.
    pub async fn settle(&self, binding: &ThrottleBinding, status: u16) -> ThrottleResult<bool> {
        if binding.policy.count_all_requests {
            return Ok(false);
        }

        if !is_success_status(status) {
            trace!(key = %binding.key, status = status, "Failed request not counted");
            return Ok(false);
        }

        let count = self
            .increment(&binding.key, binding.policy.window_seconds)
            .await?;
        debug!(key = %binding.key, count = count, "Settled successful request");
        Ok(true)
    }

    /// Run the settlement stage on a detached task
    ///
    /// Store failures can't reach the caller any more; they are logged.
    pub fn spawn_settlement(
        self: &Arc<Self>,
        binding: ThrottleBinding,
        status: u16,
    ) -> JoinHandle<()> {
        let throttler = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = throttler.settle(&binding, status).await {
                error!(key = %binding.key, error = %e, "Throttle settlement failed");
            }
        })
    }

    /// Increment the counter, starting the window on the first hit
    async fn increment(&self, key: &ThrottleKey, window_seconds: u64) -> ThrottleResult<u64> {
        let count = self.store.incr(key.as_str()).await?;

        if count == 1 {
            self.store.expire(key.as_str(), window_seconds).await?;
        }

        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Read the counter without changing it
    async fn current_count(&self, key: &ThrottleKey) -> ThrottleResult<u64> {
        let value = self.store.get(key.as_str()).await?;

        match value {
            None => Ok(0),
            Some(v) => v.trim().parse().map_err(|_| {
                ThrottleError::store(format!("counter {key} holds non-integer value {v:?}"))
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &ThrottlerConfig {
        &self.config
    }

    /// Get the default policy
    pub fn default_policy(&self) -> &ThrottlePolicy {
        &self.config.default_policy
    }

    /// Get the route registry
    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    /// Get the store type name
    pub fn store_type(&self) -> &'static str {
        self.store.store_type()
    }
}

impl std::fmt::Debug for Throttler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Throttler")
            .field("store", &self.store.store_type())
            .field("config", &self.config)
            .field("tracker", &self.tracker)
            .finish()
    }
}
