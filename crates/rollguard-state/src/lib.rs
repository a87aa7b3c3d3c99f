//! rollguard-state: workload store contracts and an embedded reference store.
//!
//! The rollout core only talks to the cluster through two traits defined in
//! [`ports`]: [`WorkloadStore`] (versioned desired state) and
//! [`InstanceObserver`] (instance readiness). Anything that speaks those
//! contracts can back a rollout.
//!
//! # Reference store
//!
//! [`StateStore`] is backed by [redb](https://docs.rs/redb) and implements
//! both traits. Workload records carry a [`VersionToken`]; an update
//! carrying a stale token is rejected with [`StateError::VersionConflict`],
//! which is the optimistic-concurrency signal the rollout mutator retries on.
//!
//! Values are JSON-serialized into redb's `&[u8]` value columns. Keys are
//! `{namespace}/{name}` for workloads and `{namespace}/{instance}` for
//! instances; instances are matched to workloads by their `app` label.

pub mod error;
pub mod ports;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use ports::{InstanceObserver, WorkloadStore};
pub use store::StateStore;
pub use types::*;
