//! rollguard-health: readiness assessment and convergence waiting.
//!
//! Answers one question for the rollout controller: are all instances of a
//! workload ready yet?
//!
//! # Architecture
//!
//! ```text
//! ConvergenceWaiter
//!   ├── InstanceObserver::list_instances() (injected)
//!   ├── Readiness::assess() → NoInstances | Partial | AllReady
//!   ├── PollTracker (poll count, consecutive observer errors)
//!   └── CancellationToken (optional early abort)
//! ```
//!
//! # Polling
//!
//! The first poll is immediate; later polls are `poll_interval` apart and
//! the last sleep is clamped so a final poll lands on the deadline. An empty
//! instance set is never treated as converged. Observer errors are logged
//! and tolerated; they only decide the outcome if they persist until the
//! deadline. A read still pending at the deadline is abandoned and counted
//! as an observer error, and intervals below [`MIN_POLL_INTERVAL`] are
//! raised to it.

pub mod readiness;
pub mod waiter;

pub use readiness::{PollTracker, Readiness};
pub use waiter::{Converged, ConvergenceWaiter, MIN_POLL_INTERVAL, MIN_READ_WINDOW, WaitError};
