//! rollguard.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration::parse_duration;

/// Verification deadline used when none is configured.
pub const DEFAULT_THRESHOLD: Duration = Duration::from_secs(10);
/// Poll interval used when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Conflict retry attempts used when none are configured.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Delay between conflict retries used when none is configured.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollguardConfig {
    pub rollout: Option<RolloutSection>,
    pub retry: Option<RetrySection>,
    pub store: Option<StoreSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RolloutSection {
    pub threshold: Option<String>,
    pub poll_interval: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrySection {
    pub max_attempts: Option<u32>,
    pub backoff: Option<String>,
    /// When set, backoff doubles per attempt up to this cap.
    pub max_backoff: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSection {
    pub path: Option<PathBuf>,
}

impl RollguardConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: RollguardConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject unparseable durations and out-of-range values.
    fn validate(&self) -> anyhow::Result<()> {
        let durations = [
            ("rollout.threshold", self.rollout.as_ref().and_then(|r| r.threshold.as_deref())),
            ("rollout.poll_interval", self.rollout.as_ref().and_then(|r| r.poll_interval.as_deref())),
            ("retry.backoff", self.retry.as_ref().and_then(|r| r.backoff.as_deref())),
            ("retry.max_backoff", self.retry.as_ref().and_then(|r| r.max_backoff.as_deref())),
        ];
        for (field, value) in durations {
            if let Some(value) = value {
                if parse_duration(value).is_none() {
                    anyhow::bail!("invalid duration for {field}: {value:?}");
                }
            }
        }
        if self.poll_interval() == Duration::ZERO {
            anyhow::bail!("rollout.poll_interval must be greater than zero");
        }
        if self.max_attempts() == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn threshold(&self) -> Duration {
        self.rollout
            .as_ref()
            .and_then(|r| r.threshold.as_deref())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_THRESHOLD)
    }

    pub fn poll_interval(&self) -> Duration {
        self.rollout
            .as_ref()
            .and_then(|r| r.poll_interval.as_deref())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_POLL_INTERVAL)
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry
            .as_ref()
            .and_then(|r| r.max_attempts)
            .unwrap_or(DEFAULT_MAX_ATTEMPTS)
    }

    pub fn backoff(&self) -> Duration {
        self.retry
            .as_ref()
            .and_then(|r| r.backoff.as_deref())
            .and_then(parse_duration)
            .unwrap_or(DEFAULT_BACKOFF)
    }

    pub fn max_backoff(&self) -> Option<Duration> {
        self.retry
            .as_ref()
            .and_then(|r| r.max_backoff.as_deref())
            .and_then(parse_duration)
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_ref().and_then(|s| s.path.as_deref())
    }

    /// Scaffold a config file carrying every default explicitly.
    pub fn scaffold() -> Self {
        RollguardConfig {
            rollout: Some(RolloutSection {
                threshold: Some("10s".to_string()),
                poll_interval: Some("2s".to_string()),
            }),
            retry: Some(RetrySection {
                max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
                backoff: Some("10ms".to_string()),
                max_backoff: None,
            }),
            store: None,
        }
    }
}
