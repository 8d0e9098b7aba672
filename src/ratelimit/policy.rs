//! Rate limit policy configuration.
//!
//! A policy names one limiter algorithm and its parameters. Policies are
//! usually read from YAML, either inline in the service configuration or
//! from a standalone file holding a list of policies:
//!
//! ```yaml
//! - name: fixed
//!   algorithm: fixed_window
//!   permit_limit: 5
//!   window: 10s
//!   queue_limit: 2
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::algorithm::Algorithm;
use super::concurrency::ConcurrencyLimit;
use super::fixed_window::FixedWindow;
use super::sliding_window::SlidingWindow;
use super::token_bucket::TokenBucket;
use crate::error::{Result, TurnstileError};

/// A named rate limiting policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Unique policy name routes refer to
    pub name: String,
    /// Maximum permits held by queued callers; zero disables queueing
    #[serde(default)]
    pub queue_limit: u32,
    /// Algorithm and its parameters
    #[serde(flatten)]
    pub algorithm: AlgorithmConfig,
}

/// Algorithm selection, tagged by `algorithm` in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum AlgorithmConfig {
    FixedWindow {
        permit_limit: u32,
        #[serde(with = "humantime_serde")]
        window: Duration,
    },
    SlidingWindow {
        permit_limit: u32,
        #[serde(with = "humantime_serde")]
        window: Duration,
        segments_per_window: u32,
    },
    TokenBucket {
        token_limit: u32,
        #[serde(with = "humantime_serde")]
        replenishment_period: Duration,
        tokens_per_period: u32,
        #[serde(default = "default_auto_replenishment")]
        auto_replenishment: bool,
    },
    Concurrency {
        permit_limit: u32,
    },
}

/// Longest window or replenishment period a policy may use.
pub const MAX_PERIOD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Most segments a sliding window may be split into.
pub const MAX_SEGMENTS_PER_WINDOW: u32 = 1024;

fn default_auto_replenishment() -> bool {
    true
}

impl PolicyConfig {
    /// A fixed window policy without a queue.
    pub fn fixed_window(name: impl Into<String>, permit_limit: u32, window: Duration) -> Self {
        Self::with_algorithm(name, AlgorithmConfig::FixedWindow { permit_limit, window })
    }

    /// A sliding window policy without a queue.
    pub fn sliding_window(
        name: impl Into<String>,
        permit_limit: u32,
        window: Duration,
        segments_per_window: u32,
    ) -> Self {
        Self::with_algorithm(
            name,
            AlgorithmConfig::SlidingWindow {
                permit_limit,
                window,
                segments_per_window,
            },
        )
    }

    /// An automatically replenished token bucket policy without a queue.
    pub fn token_bucket(
        name: impl Into<String>,
        token_limit: u32,
        tokens_per_period: u32,
        replenishment_period: Duration,
    ) -> Self {
        Self::with_algorithm(
            name,
            AlgorithmConfig::TokenBucket {
                token_limit,
                replenishment_period,
                tokens_per_period,
                auto_replenishment: true,
            },
        )
    }

    /// A concurrency policy without a queue.
    pub fn concurrency(name: impl Into<String>, permit_limit: u32) -> Self {
        Self::with_algorithm(name, AlgorithmConfig::Concurrency { permit_limit })
    }

    fn with_algorithm(name: impl Into<String>, algorithm: AlgorithmConfig) -> Self {
        Self {
            name: name.into(),
            queue_limit: 0,
            algorithm,
        }
    }

    /// Set the queue limit.
    pub fn with_queue_limit(mut self, queue_limit: u32) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    /// Turn automatic replenishment off. Only meaningful for token buckets.
    pub fn with_manual_replenishment(mut self) -> Self {
        if let AlgorithmConfig::TokenBucket {
            auto_replenishment, ..
        } = &mut self.algorithm
        {
            *auto_replenishment = false;
        }
        self
    }

    /// Check the parameters before a limiter is built from them.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(TurnstileError::Config(
                "rate limit policy name must not be empty".to_string(),
            ));
        }

        let invalid = |reason: &str| {
            Err(TurnstileError::Config(format!(
                "rate limit policy '{}': {}",
                self.name, reason
            )))
        };

        match &self.algorithm {
            AlgorithmConfig::FixedWindow { permit_limit, window } => {
                if *permit_limit == 0 {
                    return invalid("permit_limit must be greater than zero");
                }
                if window.is_zero() {
                    return invalid("window must be greater than zero");
                }
                if *window > MAX_PERIOD {
                    return invalid("window must not exceed one year");
                }
            }
            AlgorithmConfig::SlidingWindow {
                permit_limit,
                window,
                segments_per_window,
            } => {
                if *permit_limit == 0 {
                    return invalid("permit_limit must be greater than zero");
                }
                if *segments_per_window == 0 {
                    return invalid("segments_per_window must be greater than zero");
                }
                if *segments_per_window > MAX_SEGMENTS_PER_WINDOW {
                    return invalid("segments_per_window must not exceed 1024");
                }
                if *window > MAX_PERIOD {
                    return invalid("window must not exceed one year");
                }
                if (*window / *segments_per_window).is_zero() {
                    return invalid("window is too short for segments_per_window");
                }
            }
            AlgorithmConfig::TokenBucket {
                token_limit,
                replenishment_period,
                tokens_per_period,
                ..
            } => {
                if *token_limit == 0 {
                    return invalid("token_limit must be greater than zero");
                }
                if *tokens_per_period == 0 {
                    return invalid("tokens_per_period must be greater than zero");
                }
                if replenishment_period.is_zero() {
                    return invalid("replenishment_period must be greater than zero");
                }
                if *replenishment_period > MAX_PERIOD {
                    return invalid("replenishment_period must not exceed one year");
                }
            }
            AlgorithmConfig::Concurrency { permit_limit } => {
                if *permit_limit == 0 {
                    return invalid("permit_limit must be greater than zero");
                }
            }
        }

        Ok(())
    }

    /// Load a list of policies from a YAML file.
    pub fn list_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<Self>> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading rate limit policies");

        let contents = std::fs::read_to_string(path)?;
        Self::list_from_yaml(&contents)
    }

    /// Load a list of policies from a YAML string.
    pub fn list_from_yaml(yaml: &str) -> Result<Vec<Self>> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TurnstileError::Config(format!("Failed to parse rate limit policies: {}", e))
        })
    }
}

impl AlgorithmConfig {
    /// Build fresh algorithm state starting at `now`.
    pub fn build(&self, now: Instant) -> Box<dyn Algorithm> {
        match *self {
            AlgorithmConfig::FixedWindow { permit_limit, window } => {
                Box::new(FixedWindow::new(permit_limit, window, now))
            }
            AlgorithmConfig::SlidingWindow {
                permit_limit,
                window,
                segments_per_window,
            } => Box::new(SlidingWindow::new(
                permit_limit,
                window,
                segments_per_window,
                now,
            )),
            AlgorithmConfig::TokenBucket {
                token_limit,
                replenishment_period,
                tokens_per_period,
                auto_replenishment,
            } => Box::new(TokenBucket::new(
                token_limit,
                tokens_per_period,
                replenishment_period,
                auto_replenishment,
                now,
            )),
            AlgorithmConfig::Concurrency { permit_limit } => {
                Box::new(ConcurrencyLimit::new(permit_limit))
            }
        }
    }
}

/// The stock policies the service starts with when none are configured.
pub fn default_policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig::fixed_window("fixed", 5, Duration::from_secs(10)).with_queue_limit(2),
        PolicyConfig::sliding_window("sliding", 5, Duration::from_secs(10), 2).with_queue_limit(2),
        PolicyConfig::token_bucket("token", 10, 4, Duration::from_secs(20)).with_queue_limit(2),
        PolicyConfig::concurrency("concurrency", 10).with_queue_limit(2),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_policy_list() {
        let yaml = r#"
- name: fixed
  algorithm: fixed_window
  permit_limit: 5
  window: 10s
  queue_limit: 2
- name: sliding
  algorithm: sliding_window
  permit_limit: 5
  window: 10s
  segments_per_window: 2
- name: token
  algorithm: token_bucket
  token_limit: 10
  tokens_per_period: 4
  replenishment_period: 20s
- name: concurrency
  algorithm: concurrency
  permit_limit: 10
  queue_limit: 2
"#;
        let policies = PolicyConfig::list_from_yaml(yaml).unwrap();
        assert_eq!(policies.len(), 4);
        assert_eq!(
            policies[0],
            PolicyConfig::fixed_window("fixed", 5, Duration::from_secs(10)).with_queue_limit(2)
        );
        assert_eq!(policies[1].queue_limit, 0);
        assert_eq!(
            policies[2].algorithm,
            AlgorithmConfig::TokenBucket {
                token_limit: 10,
                replenishment_period: Duration::from_secs(20),
                tokens_per_period: 4,
                auto_replenishment: true,
            }
        );
        assert_eq!(policies[3], PolicyConfig::concurrency("concurrency", 10).with_queue_limit(2));
    }

    #[test]
    fn test_parse_manual_replenishment() {
        let yaml = r#"
- name: manual
  algorithm: token_bucket
  token_limit: 3
  tokens_per_period: 1
  replenishment_period: 500ms
  auto_replenishment: false
"#;
        let policies = PolicyConfig::list_from_yaml(yaml).unwrap();
        assert_eq!(
            policies[0],
            PolicyConfig::token_bucket("manual", 3, 1, Duration::from_millis(500))
                .with_manual_replenishment()
        );
    }

    #[test]
    fn test_parse_rejects_unknown_algorithm() {
        let yaml = r#"
- name: leaky
  algorithm: leaky_bucket
  permit_limit: 5
"#;
        let result = PolicyConfig::list_from_yaml(yaml);
        assert!(matches!(result, Err(TurnstileError::Config(_))));
    }

    #[test]
    fn test_parse_rejects_bad_duration() {
        let yaml = r#"
- name: fixed
  algorithm: fixed_window
  permit_limit: 5
  window: ten seconds
"#;
        assert!(PolicyConfig::list_from_yaml(yaml).is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        for policy in default_policies() {
            policy.validate().unwrap();
        }
    }

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let bad = [
            PolicyConfig::fixed_window("", 5, Duration::from_secs(1)),
            PolicyConfig::fixed_window("a", 0, Duration::from_secs(1)),
            PolicyConfig::fixed_window("b", 5, Duration::ZERO),
            PolicyConfig::sliding_window("c", 5, Duration::from_secs(1), 0),
            PolicyConfig::sliding_window("d", 5, Duration::from_nanos(2), 3),
            PolicyConfig::token_bucket("e", 0, 1, Duration::from_secs(1)),
            PolicyConfig::token_bucket("f", 5, 0, Duration::from_secs(1)),
            PolicyConfig::token_bucket("g", 5, 1, Duration::ZERO),
            PolicyConfig::concurrency("h", 0),
            PolicyConfig::fixed_window("i", 5, Duration::from_secs(u64::MAX / 2)),
            PolicyConfig::sliding_window("j", 5, Duration::from_secs(u64::MAX / 2), 2),
            PolicyConfig::sliding_window("k", 5, Duration::from_secs(3600), 1_000_000),
            PolicyConfig::token_bucket("l", 5, 1, MAX_PERIOD + Duration::from_secs(1)),
        ];

        for policy in bad {
            assert!(
                matches!(policy.validate(), Err(TurnstileError::Config(_))),
                "{:?} should be rejected",
                policy
            );
        }
    }

    #[test]
    fn test_validate_accepts_upper_bounds() {
        PolicyConfig::fixed_window("a", 1, MAX_PERIOD).validate().unwrap();
        PolicyConfig::sliding_window("b", 1, MAX_PERIOD, MAX_SEGMENTS_PER_WINDOW)
            .validate()
            .unwrap();
        PolicyConfig::token_bucket("c", 1, 1, MAX_PERIOD).validate().unwrap();
    }

    #[test]
    fn test_parse_rejects_oversized_window() {
        let yaml = r#"
- name: huge
  algorithm: fixed_window
  permit_limit: 1
  window: 500000000000years
"#;
        // Either the duration itself does not parse or validation refuses it.
        if let Ok(policies) = PolicyConfig::list_from_yaml(yaml) {
            assert!(policies[0].validate().is_err());
        }
    }

    #[test]
    fn test_build_matches_algorithm() {
        let now = Instant::now();
        let policies = default_policies();
        let expected = [
            ("fixed_window", 5),
            ("sliding_window", 5),
            ("token_bucket", 10),
            ("concurrency", 10),
        ];

        for (policy, (kind, limit)) in policies.iter().zip(expected) {
            let algorithm = policy.algorithm.build(now);
            assert_eq!(algorithm.kind(), kind);
            assert_eq!(algorithm.limit(), limit);
            assert_eq!(algorithm.available(), limit);
        }
    }
}
