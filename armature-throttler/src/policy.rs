//! Throttle policies
//!
//! A [`ThrottlePolicy`] is the process-wide default, fixed once at startup.
//! Routes may attach a [`PolicyOverride`] carrying any subset of the same
//! fields. Before any store access the two are merged into an
//! [`EffectivePolicy`] with every field concrete.
//!
//! ## Counting modes
//!
//! - **Count all requests**: every request increments the window counter in
//!   the decision stage, whatever the handler's outcome.
//! - **Success only** (default): the decision stage only reads the counter;
//!   the increment happens after the handler returns a non-error status.
//!
//! ## Example
//!
//! ```rust
//! use armature_throttler::{PolicyOverride, ThrottlePolicy};
//!
//! let default = ThrottlePolicy::new(60, 100).unwrap();
//! let login = PolicyOverride::new().limit(5).error_message("Too many login attempts");
//!
//! let effective = default.resolve(Some(&login));
//! assert_eq!(effective.window_seconds, 60);
//! assert_eq!(effective.limit, 5);
//! assert!(!effective.count_all_requests);
//! ```

use crate::error::{DEFAULT_ERROR_MESSAGE, ThrottleError, ThrottleResult};
use serde::{Deserialize, Serialize};

/// Default throttle policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottlePolicy {
    /// Window length in seconds (the counter's TTL)
    pub window_seconds: u64,
    /// Maximum counted requests per window
    pub limit: u64,
    /// Message returned when the limit is exceeded
    #[serde(default)]
    pub error_message: Option<String>,
    /// Count every request instead of successful ones only
    #[serde(default)]
    pub count_all_requests: bool,
}

impl ThrottlePolicy {
    /// Create a policy of `limit` requests per `window_seconds`
    ///
    /// # Errors
    ///
    /// Returns a configuration error if either value is zero.
    pub fn new(window_seconds: u64, limit: u64) -> ThrottleResult<Self> {
        let policy = Self {
            window_seconds,
            limit,
            error_message: None,
            count_all_requests: false,
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Set the default error message
    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Count every request instead of successful ones only
    pub fn with_count_all_requests(mut self, count_all: bool) -> Self {
        self.count_all_requests = count_all;
        self
    }

    /// Check that the window and limit are positive
    pub fn validate(&self) -> ThrottleResult<()> {
        if self.window_seconds == 0 {
            return Err(ThrottleError::config("windowSeconds must be greater than 0"));
        }
        if self.limit == 0 {
            return Err(ThrottleError::config("limit must be greater than 0"));
        }
        Ok(())
    }

    /// Merge an optional route override into a fully resolved policy
    ///
    /// Each field takes the route value when it is set and truthy (non-zero
    /// numbers, non-empty message, `true`), otherwise the default.
    pub fn resolve(&self, route: Option<&PolicyOverride>) -> EffectivePolicy {
        let route = route.cloned().unwrap_or_default();

        let window_seconds = route
            .window_seconds
            .filter(|w| *w > 0)
            .unwrap_or(self.window_seconds);
        let limit = route.limit.filter(|l| *l > 0).unwrap_or(self.limit);
        let error_message = route
            .error_message
            .filter(|m| !m.is_empty())
            .or_else(|| self.error_message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
        let count_all_requests =
            route.count_all_requests.unwrap_or(false) || self.count_all_requests;

        EffectivePolicy {
            window_seconds,
            limit,
            error_message,
            count_all_requests,
        }
    }
}

impl Default for ThrottlePolicy {
    /// 100 requests per minute, success-only counting
    fn default() -> Self {
        Self {
            window_seconds: 60,
            limit: 100,
            error_message: None,
            count_all_requests: false,
        }
    }
}

/// Per-route policy fragment; unset fields fall back to the default policy
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyOverride {
    /// Window length in seconds
    #[serde(default)]
    pub window_seconds: Option<u64>,
    /// Maximum counted requests per window
    #[serde(default)]
    pub limit: Option<u64>,
    /// Message returned when the limit is exceeded
    #[serde(default)]
    pub error_message: Option<String>,
    /// Count every request instead of successful ones only
    #[serde(default)]
    pub count_all_requests: Option<bool>,
}

impl PolicyOverride {
    /// Create an empty override
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the window length
    pub fn window_seconds(mut self, seconds: u64) -> Self {
        self.window_seconds = Some(seconds);
        self
    }

    /// Override the limit
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Override the error message
    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Override the counting mode
    pub fn count_all_requests(mut self, count_all: bool) -> Self {
        self.count_all_requests = Some(count_all);
        self
    }
}

/// Policy used for a single request, every field resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectivePolicy {
    /// Window length in seconds
    pub window_seconds: u64,
    /// Maximum counted requests per window
    pub limit: u64,
    /// Message returned when the limit is exceeded
    pub error_message: String,
    /// Count every request instead of successful ones only
    pub count_all_requests: bool,
}

impl EffectivePolicy {
    /// Whether `count` rejects the current request
    ///
    /// In count-all mode the count already includes this request, so it is
    /// rejected only past the limit. In success-only mode the count holds
    /// settled requests only, so reaching the limit is enough.
    pub fn exceeded_by(&self, count: u64) -> bool {
        if self.count_all_requests {
            count > self.limit
        } else {
            count >= self.limit
        }
    }

    /// Requests left in the window after `count`, never negative
    pub fn remaining(&self, count: u64) -> u64 {
        self.limit.saturating_sub(count)
    }

    /// Human-readable summary
    pub fn description(&self) -> String {
        format!(
            "{} requests per {}s ({})",
            self.limit,
            self.window_seconds,
            if self.count_all_requests {
                "all requests"
            } else {
                "successful requests"
            }
        )
    }
}
