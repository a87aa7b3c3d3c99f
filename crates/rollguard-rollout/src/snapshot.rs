//! Rollback target captured once at the start of a rollout.

use rollguard_state::{StateError, StateResult, VersionToken, Versioned, WorkloadId, WorkloadSpec, WorkloadStore};

/// Immutable copy of a workload's desired state.
///
/// Only the managed container image is ever restored from it; the rest of
/// the descriptor may have moved on by the time a rollback happens.
#[derive(Debug, Clone)]
pub struct Snapshot {
    record: Versioned<WorkloadSpec>,
    image: String,
}

impl Snapshot {
    /// Read the current desired state of `workload`.
    ///
    /// Fails with `InvalidSpec` if there is no managed container to restore.
    pub async fn capture<S>(store: &S, workload: &WorkloadId) -> StateResult<Self>
    where
        S: WorkloadStore + ?Sized,
    {
        let record = store.get_desired_state(workload).await?;
        let image = record
            .value
            .managed_image()
            .ok_or_else(|| {
                StateError::InvalidSpec(format!("workload {workload} has no container template"))
            })?
            .to_string();
        Ok(Self { record, image })
    }

    /// Managed container image at capture time.
    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn version(&self) -> VersionToken {
        self.record.version
    }

    pub fn spec(&self) -> &WorkloadSpec {
        &self.record.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollguard_state::StateStore;

    #[tokio::test]
    async fn captures_image_and_version() {
        let store = StateStore::open_in_memory().unwrap();
        let spec = WorkloadSpec::single_container(WorkloadId::new("default", "redis"), "redis:7", 2);
        store.register_workload(&spec).unwrap();
        store.register_workload(&spec).unwrap();

        let snapshot = Snapshot::capture(&store, &spec.id).await.unwrap();
        assert_eq!(snapshot.image(), "redis:7");
        assert_eq!(snapshot.version(), VersionToken(2));
        assert_eq!(snapshot.spec().replicas, 2);
    }

    #[tokio::test]
    async fn rejects_workload_without_containers() {
        let store = StateStore::open_in_memory().unwrap();
        let mut spec = WorkloadSpec::single_container(WorkloadId::new("default", "redis"), "redis:7", 2);
        spec.template.containers.clear();
        store.register_workload(&spec).unwrap();

        let err = Snapshot::capture(&store, &spec.id).await.unwrap_err();
        assert!(matches!(err, StateError::InvalidSpec(_)));
    }
}
