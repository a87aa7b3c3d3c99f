//! Collaborator contracts consumed by the rollout core.
//!
//! Implementations talk to whatever actually owns the workload: an
//! orchestrator API, the embedded [`StateStore`](crate::StateStore), or a
//! scripted fake in tests.

use async_trait::async_trait;

use crate::error::StateResult;
use crate::types::{Instance, Versioned, VersionToken, WorkloadId, WorkloadSpec};

/// Read/write access to a workload's desired-state record.
#[async_trait]
pub trait WorkloadStore: Send + Sync {
    /// Read the latest desired state and the version it was read at.
    async fn get_desired_state(&self, id: &WorkloadId) -> StateResult<Versioned<WorkloadSpec>>;

    /// Write `spec` if the record is still at `version`.
    ///
    /// Fails with [`StateError::VersionConflict`](crate::StateError::VersionConflict)
    /// when `version` is stale. Returns the version of the written record.
    async fn update_desired_state(
        &self,
        id: &WorkloadId,
        spec: &WorkloadSpec,
        version: VersionToken,
    ) -> StateResult<VersionToken>;
}

/// Read access to the instances backing a workload.
#[async_trait]
pub trait InstanceObserver: Send + Sync {
    /// All instances whose labels match the workload.
    async fn list_instances(&self, id: &WorkloadId) -> StateResult<Vec<Instance>>;
}
