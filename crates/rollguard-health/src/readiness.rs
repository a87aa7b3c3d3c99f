//! Readiness assessment for a workload's instance set.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rollguard_state::{Instance, StateError};

/// Aggregate readiness of all instances observed for a workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Readiness {
    /// No instances scheduled (yet).
    NoInstances,
    /// Some instances are not ready.
    Partial { ready: u32, total: u32 },
    /// Every instance reports every container ready.
    AllReady { total: u32 },
}

impl Readiness {
    /// Classify an observed instance set.
    pub fn assess(instances: &[Instance]) -> Self {
        if instances.is_empty() {
            return Readiness::NoInstances;
        }
        let total = count(instances.len());
        let ready = count(instances.iter().filter(|i| i.is_ready()).count());
        if ready == total {
            Readiness::AllReady { total }
        } else {
            Readiness::Partial { ready, total }
        }
    }

    /// Whether this counts as converged. An empty set never does.
    pub fn is_converged(&self) -> bool {
        matches!(self, Readiness::AllReady { .. })
    }

    pub fn ready(&self) -> u32 {
        match self {
            Readiness::NoInstances => 0,
            Readiness::Partial { ready, .. } => *ready,
            Readiness::AllReady { total } => *total,
        }
    }

    pub fn total(&self) -> u32 {
        match self {
            Readiness::NoInstances => 0,
            Readiness::Partial { total, .. } | Readiness::AllReady { total } => *total,
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ready", self.ready(), self.total())
    }
}

fn count(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Tracks the poll results of one wait.
#[derive(Debug)]
pub struct PollTracker {
    polls: u32,
    consecutive_errors: u32,
    last_readiness: Readiness,
    last_error: Option<StateError>,
}

impl Default for PollTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PollTracker {
    pub fn new() -> Self {
        Self {
            polls: 0,
            consecutive_errors: 0,
            last_readiness: Readiness::NoInstances,
            last_error: None,
        }
    }

    /// Record a successful observation and return its assessment.
    pub fn record_instances(&mut self, instances: &[Instance]) -> Readiness {
        self.polls += 1;
        if self.consecutive_errors > 0 {
            debug!(
                errors = self.consecutive_errors,
                "observer recovered after errors"
            );
        }
        self.consecutive_errors = 0;
        self.last_error = None;
        self.last_readiness = Readiness::assess(instances);
        self.last_readiness
    }

    /// Record a failed observation. The error is kept, not propagated.
    pub fn record_error(&mut self, error: StateError) {
        self.polls += 1;
        self.consecutive_errors += 1;
        warn!(
            error = %error,
            consecutive = self.consecutive_errors,
            "error checking instance readiness"
        );
        self.last_error = Some(error);
    }

    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Assessment from the most recent successful poll.
    pub fn last_readiness(&self) -> Readiness {
        self.last_readiness
    }

    /// Take the error from the most recent poll, if that poll failed.
    pub fn take_last_error(&mut self) -> Option<StateError> {
        self.last_error.take()
    }
}
