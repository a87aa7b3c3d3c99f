//! Conflict-safe mutation of a workload's desired state.
//!
//! Every attempt re-reads the record, applies the transform to a fresh copy,
//! and writes back with the version it read. A stale version is rejected by
//! the store, so a conflicting attempt never leaves a partial write behind.

use thiserror::Error;
use tracing::{debug, info, warn};

use rollguard_state::{StateError, StateResult, Versioned, WorkloadId, WorkloadSpec, WorkloadStore};

use crate::policy::RetryPolicy;

/// Why a mutation did not land.
#[derive(Debug, Error)]
pub enum MutateError {
    /// Non-retryable read, transform, or write failure.
    #[error("store error: {0}")]
    Store(#[from] StateError),

    /// Every attempt in the retry budget hit a version conflict.
    #[error("gave up updating {workload} after {attempts} conflicting writes")]
    ConflictExhausted { workload: WorkloadId, attempts: u32 },
}

/// Apply `transform` to the latest desired state of `workload`.
///
/// The transform is re-run against a freshly read descriptor on every retry,
/// so it must only depend on its input. Returns the descriptor as written.
pub async fn mutate<S, F>(
    store: &S,
    policy: &RetryPolicy,
    workload: &WorkloadId,
    mut transform: F,
) -> Result<Versioned<WorkloadSpec>, MutateError>
where
    S: WorkloadStore + ?Sized,
    F: FnMut(&mut WorkloadSpec) -> StateResult<()>,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let current = store.get_desired_state(workload).await?;
        let mut spec = current.value;
        transform(&mut spec)?;

        match store
            .update_desired_state(workload, &spec, current.version)
            .await
        {
            Ok(version) => {
                info!(
                    %workload,
                    attempt,
                    from = %current.version,
                    to = %version,
                    "desired state updated"
                );
                return Ok(Versioned { value: spec, version });
            }
            Err(e) if e.is_conflict() => {
                warn!(%workload, attempt, max_attempts, error = %e, "write conflicted");
                if attempt < max_attempts {
                    let delay = policy.backoff.delay(attempt);
                    debug!(%workload, ?delay, "retrying after backoff");
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(MutateError::Store(e)),
        }
    }

    Err(MutateError::ConflictExhausted {
        workload: workload.clone(),
        attempts: max_attempts,
    })
}

/// Transform pointing the managed container at `image`.
pub fn set_managed_image(image: &str) -> impl FnMut(&mut WorkloadSpec) -> StateResult<()> + Send + '_ {
    move |spec| spec.set_managed_image(image)
}
