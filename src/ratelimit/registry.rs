//! Registry of named rate limiting policies.

use std::collections::HashMap;
use tracing::{debug, info};

use super::limiter::RateLimiter;
use super::policy::PolicyConfig;
use crate::error::{Result, TurnstileError};

/// Maps policy names to their limiters.
///
/// The registry is filled once at startup and only read afterwards, so it
/// needs no lock of its own; each limiter guards its own state.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    limiters: HashMap<String, RateLimiter>,
}

impl PolicyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of policies.
    pub fn from_config(policies: &[PolicyConfig]) -> Result<Self> {
        let mut registry = Self::new();
        for policy in policies {
            registry.register(policy)?;
        }

        info!(
            policies = ?registry.names(),
            "Rate limit policies registered"
        );
        Ok(registry)
    }

    /// Register a policy under its name.
    pub fn register(&mut self, policy: &PolicyConfig) -> Result<()> {
        if self.limiters.contains_key(&policy.name) {
            return Err(TurnstileError::DuplicatePolicy(policy.name.clone()));
        }

        let limiter = RateLimiter::from_policy(policy)?;
        debug!(
            policy = %policy.name,
            algorithm = limiter.kind(),
            permit_limit = limiter.permit_limit(),
            queue_limit = limiter.queue_limit(),
            "Registered rate limit policy"
        );
        self.limiters.insert(policy.name.clone(), limiter);
        Ok(())
    }

    /// Look up the limiter for a policy.
    ///
    /// Every call returns a handle to the same shared limiter.
    pub fn resolve(&self, name: &str) -> Result<RateLimiter> {
        self.limiters
            .get(name)
            .cloned()
            .ok_or_else(|| TurnstileError::UnknownPolicy(name.to_string()))
    }

    /// Get the registered policy names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.limiters.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Get the number of registered policies.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::default_policies;
    use std::time::Duration;

    #[test]
    fn test_registry_creation() {
        let registry = PolicyRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_from_config_registers_all() {
        let registry = PolicyRegistry::from_config(&default_policies()).unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(
            registry.names(),
            vec!["concurrency", "fixed", "sliding", "token"]
        );
        assert_eq!(registry.resolve("token").unwrap().kind(), "token_bucket");
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut registry = PolicyRegistry::new();
        registry
            .register(&PolicyConfig::concurrency("api", 1))
            .unwrap();

        let result = registry.register(&PolicyConfig::fixed_window("api", 5, Duration::from_secs(1)));
        assert!(matches!(result, Err(TurnstileError::DuplicatePolicy(name)) if name == "api"));
        assert_eq!(registry.resolve("api").unwrap().kind(), "concurrency");
    }

    #[test]
    fn test_invalid_policy_rejected() {
        let mut registry = PolicyRegistry::new();
        let result = registry.register(&PolicyConfig::concurrency("broken", 0));
        assert!(matches!(result, Err(TurnstileError::Config(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_policy() {
        let registry = PolicyRegistry::from_config(&default_policies()).unwrap();
        let result = registry.resolve("missing");
        assert!(matches!(result, Err(TurnstileError::UnknownPolicy(name)) if name == "missing"));
    }

    #[tokio::test]
    async fn test_resolve_returns_shared_state() {
        let mut registry = PolicyRegistry::new();
        registry
            .register(&PolicyConfig::concurrency("single", 1))
            .unwrap();

        let first = registry.resolve("single").unwrap();
        let second = registry.resolve("single").unwrap();
        assert!(first.same_instance(&second));

        let _lease = first.attempt_acquire(1).into_lease().unwrap();
        assert!(!second.attempt_acquire(1).is_granted());
        assert_eq!(second.statistics().outstanding_permits, 1);
    }
}
