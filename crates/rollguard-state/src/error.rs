//! Error types for rollguard workload stores.

use thiserror::Error;

use crate::types::VersionToken;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while reading or writing workload state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// The record changed since it was read; re-read and retry.
    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: VersionToken,
        actual: VersionToken,
    },

    #[error("invalid workload spec: {0}")]
    InvalidSpec(String),

    /// Another handle holds the store's file lock.
    #[error("store is locked by another process: {0}")]
    Locked(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StateError {
    /// Whether this is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::VersionConflict { .. })
    }
}
