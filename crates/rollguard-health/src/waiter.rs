//! Polls instance readiness until all instances are ready or a
//! deadline passes.
//!
//! A wait is in `Polling` until it ends in one of three terminal states:
//! converged (`Ok`), timed out with a readable but unready instance set
//! ([`WaitError::Timeout`]), or failed because the observer was still
//! erroring when the deadline passed ([`WaitError::Observer`]). A
//! cancellation token can end the wait early ([`WaitError::Cancelled`]).

use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rollguard_state::{InstanceObserver, StateError, WorkloadId};

use crate::readiness::{PollTracker, Readiness};

/// Shortest delay between polls; smaller intervals are raised to this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Every read gets at least this long, even one issued at the deadline.
pub const MIN_READ_WINDOW: Duration = Duration::from_secs(1);

/// Successful end of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converged {
    /// Number of ready instances at convergence.
    pub instances: u32,
    /// Polls issued, including failed ones.
    pub polls: u32,
    pub elapsed: Duration,
}

/// Why a wait did not converge.
#[derive(Debug, Error)]
pub enum WaitError {
    #[error("{workload} did not converge within {waited:?} (last seen {last})")]
    Timeout {
        workload: WorkloadId,
        waited: Duration,
        last: Readiness,
    },

    #[error("observer for {workload} still failing at the deadline after {consecutive} consecutive errors: {source}")]
    Observer {
        workload: WorkloadId,
        consecutive: u32,
        source: StateError,
    },

    #[error("wait for {workload} cancelled")]
    Cancelled { workload: WorkloadId },
}

/// Waits for a workload's instances to become ready.
pub struct ConvergenceWaiter<'a, O: ?Sized> {
    observer: &'a O,
    cancel: CancellationToken,
}

impl<'a, O> ConvergenceWaiter<'a, O>
where
    O: InstanceObserver + ?Sized,
{
    /// Create a waiter over an observer. Without a token it can't be cancelled.
    pub fn new(observer: &'a O) -> Self {
        Self {
            observer,
            cancel: CancellationToken::new(),
        }
    }

    /// Attach a cancellation token; cancelling it ends any wait in progress.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Single immediate readiness check (a wait with a zero deadline).
    ///
    /// The one read is bounded by [`MIN_READ_WINDOW`].
    pub async fn check_once(&self, workload: &WorkloadId) -> Result<Converged, WaitError> {
        self.wait_until_healthy(workload, Duration::ZERO, Duration::ZERO)
            .await
    }

    /// Poll until every instance is ready or `deadline` has elapsed.
    ///
    /// A read still pending at the deadline is abandoned and counts as an
    /// observer error. Reads issued within [`MIN_READ_WINDOW`] of the
    /// deadline may run up to that long.
    pub async fn wait_until_healthy(
        &self,
        workload: &WorkloadId,
        deadline: Duration,
        poll_interval: Duration,
    ) -> Result<Converged, WaitError> {
        let started = Instant::now();
        let deadline_at = started + deadline;
        let mut tracker = PollTracker::new();

        if !deadline.is_zero() && poll_interval < MIN_POLL_INTERVAL {
            warn!(%workload, ?poll_interval, min = ?MIN_POLL_INTERVAL, "poll interval too small, raising it");
        }
        let poll_interval = poll_interval.max(MIN_POLL_INTERVAL);

        debug!(%workload, ?deadline, ?poll_interval, "waiting for convergence");

        loop {
            let read_started = Instant::now();
            let read_deadline = deadline_at.max(read_started + MIN_READ_WINDOW);
            let observed = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(WaitError::Cancelled { workload: workload.clone() });
                }
                observed = self.observer.list_instances(workload) => observed,
                _ = tokio::time::sleep_until(read_deadline) => Err(StateError::Unavailable(format!(
                    "no response from instance observer within {:?}",
                    read_deadline - read_started
                ))),
            };

            match observed {
                Ok(instances) => {
                    let readiness = tracker.record_instances(&instances);
                    if readiness.is_converged() {
                        let converged = Converged {
                            instances: readiness.total(),
                            polls: tracker.polls(),
                            elapsed: started.elapsed(),
                        };
                        info!(
                            %workload,
                            instances = converged.instances,
                            polls = converged.polls,
                            elapsed_ms = converged.elapsed.as_millis() as u64,
                            "all instances ready"
                        );
                        return Ok(converged);
                    }
                    debug!(%workload, %readiness, poll = tracker.polls(), "not converged yet");
                }
                Err(e) => tracker.record_error(e),
            }

            let now = Instant::now();
            if now >= deadline_at {
                return Err(expire(workload, now - started, &mut tracker));
            }

            let pause = poll_interval.min(deadline_at - now);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(WaitError::Cancelled { workload: workload.clone() });
                }
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}

fn expire(workload: &WorkloadId, waited: Duration, tracker: &mut PollTracker) -> WaitError {
    let consecutive = tracker.consecutive_errors();
    match tracker.take_last_error() {
        Some(source) => WaitError::Observer {
            workload: workload.clone(),
            consecutive,
            source,
        },
        None => WaitError::Timeout {
            workload: workload.clone(),
            waited,
            last: tracker.last_readiness(),
        },
    }
}
