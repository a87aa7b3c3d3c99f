//! Domain types for rollguard workload stores.
//!
//! These types describe a workload's desired state (what the orchestrator
//! should run) and the observed state of its instances (what is actually
//! running). All types are serializable to/from JSON.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub use rollguard_core::WorkloadId;

use crate::error::{StateError, StateResult};

// ── Versioning ────────────────────────────────────────────────────

/// Opaque optimistic-concurrency token returned with every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VersionToken(pub u64);

impl VersionToken {
    /// Token handed out for a freshly created record.
    pub const INITIAL: VersionToken = VersionToken(1);

    pub fn next(self) -> Self {
        VersionToken(self.0.saturating_add(1))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A value together with the version it was read at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub value: T,
    pub version: VersionToken,
}

// ── Workload ──────────────────────────────────────────────────────

/// Desired state of a replicated workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkloadSpec {
    pub id: WorkloadId,
    /// Number of instances the orchestrator should keep running.
    pub replicas: u32,
    /// Labels stamped onto every instance (always includes `app=<name>`).
    pub labels: BTreeMap<String, String>,
    pub template: PodTemplate,
    /// Unix timestamp (seconds) of the last desired-state change.
    pub updated_at: u64,
}

/// Template the orchestrator instantiates for every replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PodTemplate {
    pub containers: Vec<ContainerSpec>,
}

/// One container in the pod template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
}

impl WorkloadSpec {
    /// Build a single-container workload labelled `app=<name>`.
    pub fn single_container(id: WorkloadId, image: &str, replicas: u32) -> Self {
        let mut labels = BTreeMap::new();
        let (key, value) = id.selector();
        labels.insert(key.to_string(), value.to_string());
        let container = ContainerSpec {
            name: id.name.clone(),
            image: image.to_string(),
        };
        Self {
            id,
            replicas,
            labels,
            template: PodTemplate {
                containers: vec![container],
            },
            updated_at: 0,
        }
    }

    /// Image of the managed (first) container.
    pub fn managed_image(&self) -> Option<&str> {
        self.template.containers.first().map(|c| c.image.as_str())
    }

    /// Point the managed (first) container at `image`.
    pub fn set_managed_image(&mut self, image: &str) -> StateResult<()> {
        match self.template.containers.first_mut() {
            Some(container) => {
                container.image = image.to_string();
                Ok(())
            }
            None => Err(StateError::InvalidSpec(format!(
                "workload {} has no container template",
                self.id
            ))),
        }
    }
}

// ── Instance ──────────────────────────────────────────────────────

/// Observed state of one running replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Instance {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// Image the instance was started from.
    pub image: String,
    pub containers: Vec<ContainerStatus>,
    /// Unix timestamp of last status change.
    pub updated_at: u64,
}

/// Readiness of one container inside an instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContainerStatus {
    pub name: String,
    pub ready: bool,
}

impl Instance {
    /// Build an instance of `workload` with one container in the given state.
    pub fn for_workload(workload: &WorkloadSpec, name: &str, ready: bool) -> Self {
        let containers = workload
            .template
            .containers
            .iter()
            .map(|c| ContainerStatus {
                name: c.name.clone(),
                ready,
            })
            .collect();
        Self {
            name: name.to_string(),
            namespace: workload.id.namespace.clone(),
            labels: workload.labels.clone(),
            image: workload.managed_image().unwrap_or_default().to_string(),
            containers,
            updated_at: 0,
        }
    }

    /// Whether this instance belongs to `workload` (same namespace, `app` label match).
    pub fn belongs_to(&self, workload: &WorkloadId) -> bool {
        let (key, value) = workload.selector();
        self.namespace == workload.namespace
            && self.labels.get(key).map(String::as_str) == Some(value)
    }

    /// Ready iff it reports at least one container and every container is ready.
    pub fn is_ready(&self) -> bool {
        !self.containers.is_empty() && self.containers.iter().all(|c| c.ready)
    }

    /// Composite key for the instances table.
    pub fn table_key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Set every container's readiness flag.
    pub fn set_ready(&mut self, ready: bool) {
        for container in &mut self.containers {
            container.ready = ready;
        }
    }
}
