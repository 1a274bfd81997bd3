//! Tracker extraction
//!
//! A tracker is the string that identifies the caller. It is never stored as
//! is; [`ThrottleKey`](crate::ThrottleKey) hashes it together with the route.
//! The default tracker is the caller's address, and deployments can swap in
//! a different strategy (an API key, an authorization header, a user id) by
//! passing any [`TrackerExtractor`] to the builder.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// Tracker used when nothing identifies the caller
pub const UNKNOWN_TRACKER: &str = "unknown";

/// Header consulted when the framework did not resolve a client IP
pub const FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Information about an incoming request used for tracker extraction
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    /// Client IP address as resolved by the framework
    pub ip: Option<IpAddr>,
    /// Request headers
    pub headers: Vec<(String, String)>,
}

impl RequestInfo {
    /// Create an empty request info
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the IP address
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Add a header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Get a header value by name (case-insensitive)
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Strategy deriving the caller's tracker from a request
pub trait TrackerExtractor: Send + Sync {
    /// Derive the tracker for this request
    fn tracker(&self, info: &RequestInfo) -> String;

    /// Short description for logs
    fn description(&self) -> &str {
        "custom"
    }
}

impl<F> TrackerExtractor for F
where
    F: Fn(&RequestInfo) -> String + Send + Sync,
{
    fn tracker(&self, info: &RequestInfo) -> String {
        self(info)
    }
}

/// Tracks callers by network address
///
/// Uses the resolved client IP, then the `X-Forwarded-For` value, then
/// [`UNKNOWN_TRACKER`].
#[derive(Debug, Clone, Copy, Default)]
pub struct IpTracker;

impl TrackerExtractor for IpTracker {
    fn tracker(&self, info: &RequestInfo) -> String {
        if let Some(ip) = info.ip {
            return ip.to_string();
        }

        info.get_header(FORWARDED_FOR_HEADER)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_TRACKER.to_string())
    }

    fn description(&self) -> &str {
        "IP address"
    }
}

/// Tracks callers by a request header, e.g. `Authorization`
///
/// Requests without the header fall back to [`IpTracker`].
#[derive(Debug, Clone)]
pub struct HeaderTracker {
    name: String,
}

impl HeaderTracker {
    /// Track by the given header
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Track by the `Authorization` header
    pub fn authorization() -> Self {
        Self::new("Authorization")
    }

    /// Header name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TrackerExtractor for HeaderTracker {
    fn tracker(&self, info: &RequestInfo) -> String {
        match info.get_header(&self.name).filter(|v| !v.is_empty()) {
            Some(value) => value.to_string(),
            None => IpTracker.tracker(info),
        }
    }

    fn description(&self) -> &str {
        &self.name
    }
}

/// Shared handle to a tracker strategy
#[derive(Clone)]
pub struct SharedTracker(Arc<dyn TrackerExtractor>);

impl SharedTracker {
    /// Wrap a tracker strategy
    pub fn new(extractor: impl TrackerExtractor + 'static) -> Self {
        Self(Arc::new(extractor))
    }

    /// Derive the tracker for this request
    pub fn tracker(&self, info: &RequestInfo) -> String {
        self.0.tracker(info)
    }

    /// Short description for logs
    pub fn description(&self) -> &str {
        self.0.description()
    }
}

impl Default for SharedTracker {
    fn default() -> Self {
        Self::new(IpTracker)
    }
}

impl fmt::Debug for SharedTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedTracker")
            .field(&self.description())
            .finish()
    }
}
