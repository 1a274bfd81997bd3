//! Route identity and per-route throttle settings
//!
//! Settings are registered once, when routes are mounted, and looked up by
//! [`RouteId`] on every request.

use crate::policy::PolicyOverride;
use dashmap::DashMap;
use std::fmt;
use tracing::debug;

/// Identity of a protected operation: controller plus handler
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId {
    controller: String,
    handler: String,
}

impl RouteId {
    /// Create a route identity
    pub fn new(controller: impl Into<String>, handler: impl Into<String>) -> Self {
        Self {
            controller: controller.into(),
            handler: handler.into(),
        }
    }

    /// Controller (resource) name
    pub fn controller(&self) -> &str {
        &self.controller
    }

    /// Handler (operation) name
    pub fn handler(&self) -> &str {
        &self.handler
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.controller, self.handler)
    }
}

/// Throttle settings attached to one route
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteThrottle {
    /// Policy fields overriding the default
    pub policy: Option<PolicyOverride>,
    /// Never throttle this route
    pub skip: bool,
}

/// Side-table mapping routes to their throttle settings
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: DashMap<RouteId, RouteThrottle>,
}

impl RouteRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a policy override to a route
    pub fn set_policy(&self, route: RouteId, policy: PolicyOverride) {
        debug!(route = %route, policy = ?policy, "Registering route throttle policy");
        self.routes.entry(route).or_default().policy = Some(policy);
    }

    /// Mark a route as never throttled
    pub fn skip(&self, route: RouteId) {
        debug!(route = %route, "Registering throttle bypass");
        self.routes.entry(route).or_default().skip = true;
    }

    /// Policy override for a route, if any
    pub fn policy(&self, route: &RouteId) -> Option<PolicyOverride> {
        self.routes.get(route).and_then(|r| r.policy.clone())
    }

    /// Whether a route bypasses throttling
    pub fn is_skipped(&self, route: &RouteId) -> bool {
        self.routes.get(route).is_some_and(|r| r.skip)
    }

    /// Number of routes with registered settings
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Whether no route has registered settings
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_display() {
        let route = RouteId::new("AuthController", "login");
        assert_eq!(route.to_string(), "AuthController::login");
        assert_eq!(route.controller(), "AuthController");
        assert_eq!(route.handler(), "login");
    }

    #[test]
    fn test_registry_lookup() {
        let registry = RouteRegistry::new();
        let login = RouteId::new("AuthController", "login");
        let health = RouteId::new("HealthController", "check");

        registry.set_policy(login.clone(), PolicyOverride::new().limit(5));
        registry.skip(health.clone());

        assert_eq!(registry.policy(&login), Some(PolicyOverride::new().limit(5)));
        assert!(!registry.is_skipped(&login));
        assert!(registry.is_skipped(&health));
        assert_eq!(registry.policy(&health), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_unknown_route() {
        let registry = RouteRegistry::new();
        let route = RouteId::new("UsersController", "list");

        assert!(registry.is_empty());
        assert!(!registry.is_skipped(&route));
        assert_eq!(registry.policy(&route), None);
    }

    #[test]
    fn test_skip_keeps_policy() {
        let registry = RouteRegistry::new();
        let route = RouteId::new("UsersController", "export");

        registry.set_policy(route.clone(), PolicyOverride::new().limit(1));
        registry.skip(route.clone());

        assert!(registry.is_skipped(&route));
        assert!(registry.policy(&route).is_some());
    }
}
