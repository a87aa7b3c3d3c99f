//! Shared types used across rollguard crates.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Namespace assumed when a workload is named without one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Label key that ties an instance to the workload that owns it.
pub const APP_LABEL: &str = "app";

/// Identifies a workload within the cluster: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkloadId {
    pub namespace: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkloadIdError {
    #[error("workload id is empty")]
    Empty,
    #[error("invalid workload id: {0} (expected `namespace/name` or `name`)")]
    Invalid(String),
}

impl WorkloadId {
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Composite key used by stores: `{namespace}/{name}`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// The `app=<name>` selector matching this workload's instances.
    pub fn selector(&self) -> (&'static str, &str) {
        (APP_LABEL, self.name.as_str())
    }
}

impl fmt::Display for WorkloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for WorkloadId {
    type Err = WorkloadIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(WorkloadIdError::Empty);
        }
        let (namespace, name) = s.split_once('/').unwrap_or((DEFAULT_NAMESPACE, s));
        if namespace.is_empty() || name.is_empty() || name.contains('/') {
            return Err(WorkloadIdError::Invalid(s.to_string()));
        }
        Ok(Self::new(namespace, name))
    }
}
