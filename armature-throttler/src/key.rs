//! Limiting key derivation

use crate::route::RouteId;
use sha2::{Digest, Sha256};
use std::fmt;

/// Store key for "this caller on this route"
///
/// SHA-256 over the route identity and the tracker, hex encoded. The digest
/// keeps keys at 64 characters whatever the tracker holds and keeps raw
/// caller identifiers out of the store's keyspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThrottleKey(String);

impl ThrottleKey {
    /// Derive the key for a route and tracker
    pub fn derive(route: &RouteId, tracker: &str) -> Self {
        // Each route component is length-prefixed, so neither a '::' inside a
        // controller path nor the '-' separator can shift a boundary.
        let mut hasher = Sha256::new();
        update_prefixed(&mut hasher, route.controller());
        update_prefixed(&mut hasher, route.handler());
        hasher.update(b"-");
        hasher.update(tracker.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn update_prefixed(hasher: &mut Sha256, component: &str) {
    hasher.update(component.len().to_string().as_bytes());
    hasher.update(b":");
    hasher.update(component.as_bytes());
}

impl fmt::Display for ThrottleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ThrottleKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let route = RouteId::new("AuthController", "login");
        assert_eq!(
            ThrottleKey::derive(&route, "10.0.0.1"),
            ThrottleKey::derive(&route, "10.0.0.1")
        );
    }

    #[test]
    fn test_fixed_length_hex() {
        let route = RouteId::new("AuthController", "login");
        let key = ThrottleKey::derive(&route, &"x".repeat(4096));

        assert_eq!(key.as_str().len(), 64);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!key.as_str().contains("xxxx"));
    }

    #[test]
    fn test_distinct_trackers_and_routes() {
        let login = RouteId::new("AuthController", "login");
        let logout = RouteId::new("AuthController", "logout");

        assert_ne!(
            ThrottleKey::derive(&login, "10.0.0.1"),
            ThrottleKey::derive(&login, "10.0.0.2")
        );
        assert_ne!(
            ThrottleKey::derive(&login, "10.0.0.1"),
            ThrottleKey::derive(&logout, "10.0.0.1")
        );
    }

    #[test]
    fn test_separator_is_unambiguous() {
        let a = RouteId::new("Api", "get-user");
        let b = RouteId::new("Api", "get");

        assert_ne!(
            ThrottleKey::derive(&a, "1"),
            ThrottleKey::derive(&b, "user-1")
        );
    }

    #[test]
    fn test_controller_handler_boundary() {
        let nested = RouteId::new("Api::v1", "users");
        let flat = RouteId::new("Api", "v1::users");
        assert_eq!(nested.to_string(), flat.to_string());

        assert_ne!(
            ThrottleKey::derive(&nested, "10.0.0.1"),
            ThrottleKey::derive(&flat, "10.0.0.1")
        );
    }
}
