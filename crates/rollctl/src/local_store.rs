//! Rollout collaborators backed by the on-disk store file.
//!
//! redb keeps an exclusive file lock for as long as a handle is open, so a
//! rollout holding one handle would shut `status` and `mark` out for its
//! whole run. [`LocalStore`] opens the file for each call and drops it
//! before returning.
//!
//! There is no orchestrator behind the file, so an image change is
//! simulated: every instance of the workload is restarted on the new image
//! and reports unready until `rollctl mark` says otherwise.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use rollguard_state::{
    Instance, InstanceObserver, StateError, StateResult, StateStore, Versioned, VersionToken,
    WorkloadId, WorkloadSpec, WorkloadStore,
};

pub(crate) const OPEN_ATTEMPTS: u32 = 20;
pub(crate) const OPEN_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Open the store, waiting out short-lived locks held by other commands.
    async fn open(&self) -> StateResult<StateStore> {
        let mut attempt = 1;
        loop {
            match StateStore::open(&self.path) {
                Err(StateError::Locked(_)) if attempt < OPEN_ATTEMPTS => {
                    debug!(path = %self.path.display(), attempt, "store locked, retrying");
                    attempt += 1;
                    tokio::time::sleep(OPEN_BACKOFF).await;
                }
                result => return result,
            }
        }
    }
}

/// Put every instance of `id` on `image`, unready.
fn restart_instances(store: &StateStore, id: &WorkloadId, image: &str) -> StateResult<usize> {
    let instances: Vec<Instance> = store.list_instances_for_workload(id)?;
    for mut instance in instances.iter().cloned() {
        instance.image = image.to_string();
        instance.set_ready(false);
        store.put_instance(&instance)?;
    }
    Ok(instances.len())
}

#[async_trait]
impl WorkloadStore for LocalStore {
    async fn get_desired_state(&self, id: &WorkloadId) -> StateResult<Versioned<WorkloadSpec>> {
        let store = self.open().await?;
        store.get_desired_state(id).await
    }

    async fn update_desired_state(
        &self,
        id: &WorkloadId,
        spec: &WorkloadSpec,
        version: VersionToken,
    ) -> StateResult<VersionToken> {
        let store = self.open().await?;
        let previous = store
            .get_workload(id)?
            .and_then(|record| record.value.managed_image().map(str::to_string));
        let written = store.compare_and_swap(id, spec, version)?;

        if let Some(image) = spec.managed_image() {
            if previous.as_deref() != Some(image) {
                let restarted = restart_instances(&store, id, image)?;
                info!(workload = %id, %image, restarted, "instances restarted on new image");
            }
        }
        Ok(written)
    }
}

#[async_trait]
impl InstanceObserver for LocalStore {
    async fn list_instances(&self, id: &WorkloadId) -> StateResult<Vec<Instance>> {
        let store = self.open().await?;
        store.list_instances_for_workload(id)
    }
}
