//! Conflict retry and verification timing.

use std::time::Duration;

use rollguard_core::RollguardConfig;
use rollguard_core::config::{
    DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_THRESHOLD,
};

/// Delay between conflicting write attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Backoff {
    /// Same delay after every conflict.
    Fixed(Duration),
    /// Doubles after every conflict, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

impl Backoff {
    /// Delay to wait after the `attempt`-th (1-based) conflicting write.
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let doublings = attempt.saturating_sub(1);
                2u32.checked_pow(doublings)
                    .and_then(|factor| initial.checked_mul(factor))
                    .unwrap_or(max)
                    .min(max)
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Fixed(DEFAULT_BACKOFF)
    }
}

/// Bounded retry for optimistic-concurrency conflicts.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RetryPolicy {
    /// Total read-transform-write attempts, including the first.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: Backoff::default(),
        }
    }
}

/// Settings for one rollout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RolloutConfig {
    /// How long each verification may take before it counts as failed.
    pub threshold: Duration,
    /// Delay between readiness polls.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry: RetryPolicy::default(),
        }
    }
}

impl From<&RollguardConfig> for RolloutConfig {
    fn from(config: &RollguardConfig) -> Self {
        let backoff = match config.max_backoff() {
            Some(max) => Backoff::Exponential {
                initial: config.backoff(),
                max,
            },
            None => Backoff::Fixed(config.backoff()),
        };
        Self {
            threshold: config.threshold(),
            poll_interval: config.poll_interval(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts(),
                backoff,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_orchestrator_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, Backoff::Fixed(Duration::from_millis(10)));

        let config = RolloutConfig::default();
        assert_eq!(config.threshold, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let backoff = Backoff::Fixed(Duration::from_millis(10));
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(7), Duration::from_millis(10));
    }

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let backoff = Backoff::Exponential {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(100),
        };
        assert_eq!(backoff.delay(1), Duration::from_millis(10));
        assert_eq!(backoff.delay(2), Duration::from_millis(20));
        assert_eq!(backoff.delay(3), Duration::from_millis(40));
        assert_eq!(backoff.delay(4), Duration::from_millis(80));
        assert_eq!(backoff.delay(5), Duration::from_millis(100));
        assert_eq!(backoff.delay(64), Duration::from_millis(100));
    }

    #[test]
    fn from_file_config() {
        let file = RollguardConfig::from_toml_str(
            r#"
[rollout]
threshold = "30s"
poll_interval = "1s"

[retry]
max_attempts = 3
backoff = "50ms"
max_backoff = "400ms"
"#,
        )
        .unwrap();

        let config = RolloutConfig::from(&file);
        assert_eq!(config.threshold, Duration::from_secs(30));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(
            config.retry.backoff,
            Backoff::Exponential {
                initial: Duration::from_millis(50),
                max: Duration::from_millis(400),
            }
        );
    }
}
