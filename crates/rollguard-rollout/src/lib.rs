//! rollguard rolling updates with verification and rollback.
//!
//! This crate drives a single-workload image update: snapshot the current
//! desired state, check the baseline is healthy, write the new image, wait
//! for every instance to become ready, and restore the snapshot's image if
//! they don't.
//!
//! # Components
//!
//! - **`policy`**: Retry and verification settings (`RetryPolicy`, `Backoff`, `RolloutConfig`)
//! - **`mutator`**: Read-transform-write with retry on version conflicts
//! - **`snapshot`**: Immutable rollback target captured at rollout start
//! - **`controller`**: The rollout sequence and its outcomes

pub mod controller;
pub mod mutator;
pub mod policy;
pub mod snapshot;

pub use controller::{RolloutController, RolloutError, RolloutOutcome, RolloutPhase};
pub use mutator::{MutateError, mutate, set_managed_image};
pub use policy::{Backoff, RetryPolicy, RolloutConfig};
pub use snapshot::Snapshot;
