//! Error types for throttling

use crate::interceptor::HttpResponse;
use http::StatusCode;
use std::time::Duration;
use thiserror::Error;

/// Message used when neither the route nor the default policy provides one
pub const DEFAULT_ERROR_MESSAGE: &str = "Too Many Requests";

/// Result type for throttling operations
pub type ThrottleResult<T> = Result<T, ThrottleError>;

/// Throttling errors
#[derive(Debug, Error)]
pub enum ThrottleError {
    /// The caller exhausted the limit for the current window
    #[error("{message}")]
    LimitExceeded {
        /// Resolved error message (route, then default, then generic)
        message: String,
        /// Seconds until the window resets
        retry_after_secs: u64,
    },

    /// Counter store error (Redis, memory, etc.)
    #[error("Throttle store error: {0}")]
    StoreError(String),

    /// Configuration error
    #[error("Throttle configuration error: {0}")]
    ConfigError(String),

    /// Redis connection error
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
}

impl ThrottleError {
    /// Create a new store error
    pub fn store<S: Into<String>>(msg: S) -> Self {
        Self::StoreError(msg.into())
    }

    /// Create a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Create a limit exceeded error
    pub fn limit_exceeded(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::LimitExceeded {
            message: message.into(),
            retry_after_secs,
        }
    }

    /// Check if this error is a rate limit exceeded error
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::LimitExceeded { .. })
    }

    /// Check if this error came from the counter store
    pub fn is_store_error(&self) -> bool {
        match self {
            Self::StoreError(_) => true,
            #[cfg(feature = "redis")]
            Self::RedisError(_) => true,
            _ => false,
        }
    }

    /// Get the retry-after duration if this is a limit exceeded error
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded {
                retry_after_secs, ..
            } => Some(Duration::from_secs(*retry_after_secs)),
            _ => None,
        }
    }

    /// HTTP status classification of this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::LimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Headers that must accompany this error, if any
    pub fn headers(&self) -> Option<RateLimitHeaders> {
        match self {
            Self::LimitExceeded {
                retry_after_secs, ..
            } => Some(RateLimitHeaders::denied(*retry_after_secs)),
            _ => None,
        }
    }

    /// Render the error as an HTTP response
    ///
    /// A rejected request gets a 429 with a JSON body and `Retry-After`.
    /// Anything else becomes a bare 500; callers that want their framework's
    /// own infrastructure-failure handling should match on the error instead.
    pub fn into_response(self) -> HttpResponse {
        let status = self.status_code();
        let headers = self.headers();
        let body = serde_json::json!({
            "statusCode": status.as_u16(),
            "error": status.canonical_reason().unwrap_or("Error"),
            "message": self.to_string(),
        });

        let mut response = HttpResponse::new(status.as_u16())
            .with_header("Content-Type", "application/json")
            .with_body(body.to_string().into_bytes());

        if let Some(h) = headers {
            h.apply(&mut response);
        }

        response
    }
}

/// Response attributes set by the decision stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHeaders {
    /// X-RateLimit-Limit: maximum counted requests per window
    pub limit: Option<u64>,
    /// X-RateLimit-Remaining: requests left in the current window
    pub remaining: Option<u64>,
    /// X-RateLimit-Reset: seconds until the window resets
    pub reset: Option<u64>,
    /// Retry-After: seconds until the client should retry (only when limited)
    pub retry_after: Option<u64>,
}

impl RateLimitHeaders {
    /// Header name for the limit
    pub const LIMIT: &'static str = "X-RateLimit-Limit";
    /// Header name for the remaining count
    pub const REMAINING: &'static str = "X-RateLimit-Remaining";
    /// Header name for the reset time
    pub const RESET: &'static str = "X-RateLimit-Reset";
    /// Header name for the retry delay
    pub const RETRY_AFTER: &'static str = "Retry-After";

    /// Create headers for an allowed request
    pub fn allowed(limit: u64, remaining: u64, reset: u64) -> Self {
        Self {
            limit: Some(limit),
            remaining: Some(remaining),
            reset: Some(reset),
            retry_after: None,
        }
    }

    /// Create headers for a denied request
    pub fn denied(retry_after: u64) -> Self {
        Self {
            limit: None,
            remaining: None,
            reset: None,
            retry_after: Some(retry_after),
        }
    }

    /// Get header name/value pairs
    pub fn to_header_pairs(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(4);

        if let Some(limit) = self.limit {
            headers.push((Self::LIMIT, limit.to_string()));
        }
        if let Some(remaining) = self.remaining {
            headers.push((Self::REMAINING, remaining.to_string()));
        }
        if let Some(reset) = self.reset {
            headers.push((Self::RESET, reset.to_string()));
        }
        if let Some(retry) = self.retry_after {
            headers.push((Self::RETRY_AFTER, retry.to_string()));
        }

        headers
    }

    /// Write the headers onto a response
    pub fn apply(&self, response: &mut HttpResponse) {
        for (name, value) in self.to_header_pairs() {
            response.headers.insert(name.to_string(), value);
        }
    }
}
