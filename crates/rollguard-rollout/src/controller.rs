//! Drives one image update through verification and, if needed, rollback.
//!
//! Sequence: snapshot → baseline check → apply → verify → (rollback →
//! verify). The two verifications are the only decision points; store
//! conflicts are retried by the mutator and observer errors are tolerated
//! by the waiter.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use rollguard_core::ImageRef;
use rollguard_core::image::ImageError;
use rollguard_health::{ConvergenceWaiter, WaitError};
use rollguard_state::{InstanceObserver, StateError, WorkloadId, WorkloadStore};

use crate::mutator::{MutateError, mutate, set_managed_image};
use crate::policy::RolloutConfig;
use crate::snapshot::Snapshot;

/// Current phase of a rollout.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RolloutPhase {
    /// Capturing the rollback target.
    Snapshot,
    /// Checking the baseline is healthy before touching anything.
    PreCheck,
    /// Writing the new image.
    Applying,
    /// Waiting for the new image to converge.
    Verifying,
    /// Writing the snapshot's image back.
    RollingBack,
    /// Waiting for the restored image to converge.
    VerifyingRollback,
    /// New image converged.
    Completed,
    /// Restored image converged.
    RolledBack,
    /// Neither image converged.
    RollbackFailed,
}

impl fmt::Display for RolloutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RolloutPhase::Snapshot => "snapshot",
            RolloutPhase::PreCheck => "pre-check",
            RolloutPhase::Applying => "applying",
            RolloutPhase::Verifying => "verifying",
            RolloutPhase::RollingBack => "rolling back",
            RolloutPhase::VerifyingRollback => "verifying rollback",
            RolloutPhase::Completed => "completed",
            RolloutPhase::RolledBack => "rolled back",
            RolloutPhase::RollbackFailed => "rollback failed",
        };
        f.write_str(name)
    }
}

/// How a rollout that got past the baseline check ended.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloutOutcome {
    /// The new image converged.
    Success { image: String },
    /// The new image did not converge; the previous image was restored and converged.
    RolledBack {
        attempted_image: String,
        restored_image: String,
        reason: String,
    },
    /// Neither the new nor the restored image converged. The workload may be
    /// degraded and needs an operator.
    RollbackFailed {
        attempted_image: String,
        restored_image: String,
        reason: String,
        rollback_reason: String,
    },
}

impl RolloutOutcome {
    /// Whether the workload was left in an unverified state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RolloutOutcome::RollbackFailed { .. })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RolloutOutcome::Success { .. })
    }
}

/// Reasons a rollout was aborted before reaching a verification decision.
#[derive(Debug, Error)]
pub enum RolloutError {
    #[error("invalid image {image:?}: {source}")]
    InvalidImage { image: String, source: ImageError },

    /// Baseline was unhealthy; nothing was mutated.
    #[error("precondition failed for {workload}: {source}")]
    PreconditionFailed { workload: WorkloadId, source: WaitError },

    #[error("store error: {0}")]
    Store(#[from] StateError),

    #[error("gave up updating {workload} after {attempts} conflicting writes")]
    ConflictExhausted { workload: WorkloadId, attempts: u32 },

    /// Cancelled by the caller. `restore_image` is the pre-rollout image.
    #[error("rollout of {workload} cancelled during {phase} (previous image {restore_image})")]
    Cancelled {
        workload: WorkloadId,
        phase: RolloutPhase,
        restore_image: String,
    },
}

impl From<MutateError> for RolloutError {
    fn from(e: MutateError) -> Self {
        match e {
            MutateError::Store(e) => RolloutError::Store(e),
            MutateError::ConflictExhausted { workload, attempts } => {
                RolloutError::ConflictExhausted { workload, attempts }
            }
        }
    }
}

/// Ephemeral record of one rollout; never persisted.
#[derive(Debug)]
struct RolloutAttempt {
    workload: WorkloadId,
    previous_image: String,
    target_image: String,
    /// Verification deadline, applied to each of the two waits.
    deadline: Duration,
    poll_interval: Duration,
    phase: RolloutPhase,
    started_at: Instant,
}

impl RolloutAttempt {
    fn new(
        workload: &WorkloadId,
        previous_image: &str,
        target_image: &str,
        config: &RolloutConfig,
    ) -> Self {
        Self {
            workload: workload.clone(),
            previous_image: previous_image.to_string(),
            target_image: target_image.to_string(),
            deadline: config.threshold,
            poll_interval: config.poll_interval,
            phase: RolloutPhase::Snapshot,
            started_at: Instant::now(),
        }
    }

    fn enter(&mut self, phase: RolloutPhase) {
        debug!(
            workload = %self.workload,
            from = %self.phase,
            to = %phase,
            "rollout phase change"
        );
        self.phase = phase;
    }

    fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    fn cancelled(&self) -> RolloutError {
        warn!(workload = %self.workload, phase = %self.phase, "rollout cancelled");
        RolloutError::Cancelled {
            workload: self.workload.clone(),
            phase: self.phase.clone(),
            restore_image: self.previous_image.clone(),
        }
    }
}

/// Runs rollouts against injected store and observer collaborators.
///
/// Holds no per-rollout state, so rollouts of different workloads can run
/// concurrently on one controller.
pub struct RolloutController<S: ?Sized, O: ?Sized> {
    store: Arc<S>,
    observer: Arc<O>,
    config: RolloutConfig,
    cancel: CancellationToken,
}

impl<S, O> RolloutController<S, O>
where
    S: WorkloadStore + ?Sized,
    O: InstanceObserver + ?Sized,
{
    pub fn new(store: Arc<S>, observer: Arc<O>, config: RolloutConfig) -> Self {
        Self {
            store,
            observer,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token; cancelling aborts in-flight waits.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn waiter(&self) -> ConvergenceWaiter<'_, O> {
        ConvergenceWaiter::new(self.observer.as_ref()).with_cancellation(self.cancel.clone())
    }

    /// Update `workload` to `new_image`, verifying and rolling back as needed.
    pub async fn rollout(
        &self,
        workload: &WorkloadId,
        new_image: &str,
    ) -> Result<RolloutOutcome, RolloutError> {
        ImageRef::parse(new_image).map_err(|source| RolloutError::InvalidImage {
            image: new_image.to_string(),
            source,
        })?;

        let snapshot = Snapshot::capture(self.store.as_ref(), workload).await?;
        let mut attempt =
            RolloutAttempt::new(workload, snapshot.image(), new_image, &self.config);
        info!(
            %workload,
            from = %attempt.previous_image,
            to = %attempt.target_image,
            version = %snapshot.version(),
            replicas = snapshot.spec().replicas,
            deadline = ?attempt.deadline,
            poll_interval = ?attempt.poll_interval,
            "starting rollout"
        );

        let waiter = self.waiter();

        attempt.enter(RolloutPhase::PreCheck);
        match waiter.check_once(workload).await {
            Ok(_) => {}
            Err(WaitError::Cancelled { .. }) => return Err(attempt.cancelled()),
            Err(source) => {
                warn!(%workload, error = %source, "baseline not healthy, aborting before any change");
                return Err(RolloutError::PreconditionFailed {
                    workload: workload.clone(),
                    source,
                });
            }
        }

        attempt.enter(RolloutPhase::Applying);
        mutate(
            self.store.as_ref(),
            &self.config.retry,
            workload,
            set_managed_image(&attempt.target_image),
        )
        .await?;

        attempt.enter(RolloutPhase::Verifying);
        let forward_failure = match waiter
            .wait_until_healthy(workload, attempt.deadline, attempt.poll_interval)
            .await
        {
            Ok(_) => {
                attempt.enter(RolloutPhase::Completed);
                info!(
                    %workload,
                    image = %attempt.target_image,
                    elapsed_ms = attempt.elapsed().as_millis() as u64,
                    "rollout successful"
                );
                return Ok(RolloutOutcome::Success {
                    image: attempt.target_image,
                });
            }
            Err(WaitError::Cancelled { .. }) => return Err(attempt.cancelled()),
            Err(e) => e,
        };

        warn!(
            %workload,
            image = %attempt.target_image,
            error = %forward_failure,
            "new image did not converge, rolling back"
        );

        attempt.enter(RolloutPhase::RollingBack);
        let restored = mutate(
            self.store.as_ref(),
            &self.config.retry,
            workload,
            set_managed_image(&attempt.previous_image),
        )
        .await;
        if let Err(e) = restored {
            return Ok(rollback_failed(attempt, forward_failure.to_string(), e.to_string()));
        }

        attempt.enter(RolloutPhase::VerifyingRollback);
        match waiter
            .wait_until_healthy(workload, attempt.deadline, attempt.poll_interval)
            .await
        {
            Ok(_) => {
                attempt.enter(RolloutPhase::RolledBack);
                info!(
                    %workload,
                    image = %attempt.previous_image,
                    elapsed_ms = attempt.elapsed().as_millis() as u64,
                    "rolled back successfully"
                );
                Ok(RolloutOutcome::RolledBack {
                    attempted_image: attempt.target_image,
                    restored_image: attempt.previous_image,
                    reason: forward_failure.to_string(),
                })
            }
            Err(WaitError::Cancelled { .. }) => Err(attempt.cancelled()),
            Err(e) => Ok(rollback_failed(attempt, forward_failure.to_string(), e.to_string())),
        }
    }
}

fn rollback_failed(
    mut attempt: RolloutAttempt,
    reason: String,
    rollback_reason: String,
) -> RolloutOutcome {
    attempt.enter(RolloutPhase::RollbackFailed);
    error!(
        workload = %attempt.workload,
        attempted = %attempt.target_image,
        restored = %attempt.previous_image,
        %reason,
        %rollback_reason,
        "ROLLBACK FAILED: workload may be degraded, operator action required"
    );
    RolloutOutcome::RollbackFailed {
        attempted_image: attempt.target_image,
        restored_image: attempt.previous_image,
        reason,
        rollback_reason,
    }
}
