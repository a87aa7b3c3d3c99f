//! StateStore: redb-backed reference implementation of the workload contracts.
//!
//! Provides versioned workload records and instance readiness records. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).
//!
//! redb serialises write transactions, so the read-compare-write inside
//! [`StateStore::compare_and_swap`] is atomic with respect to other writers.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::ports::{InstanceObserver, WorkloadStore};
use crate::tables::*;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    ///
    /// Only one handle may hold a given file at a time; a second open fails
    /// with [`StateError::Locked`] until the first is dropped.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            redb::DatabaseError::DatabaseAlreadyOpen => {
                StateError::Locked(path.display().to_string())
            }
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Workloads ──────────────────────────────────────────────────

    /// Insert or replace a workload record unconditionally.
    ///
    /// Replacing bumps the version, so in-flight writers holding the old
    /// token will conflict.
    pub fn register_workload(&self, spec: &WorkloadSpec) -> StateResult<VersionToken> {
        let key = spec.id.key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let version;
        {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let previous: Option<Versioned<WorkloadSpec>> =
                match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };
            version = previous.map_or(VersionToken::INITIAL, |p| p.version.next());

            let mut value = spec.clone();
            value.updated_at = epoch_secs();
            let record = Versioned { value, version };
            let bytes = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, %version, "workload registered");
        Ok(version)
    }

    /// Get a workload record by id.
    pub fn get_workload(&self, id: &WorkloadId) -> StateResult<Option<Versioned<WorkloadSpec>>> {
        let key = id.key();
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: Versioned<WorkloadSpec> =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Write `spec` only if the stored record is still at `expected`.
    pub fn compare_and_swap(
        &self,
        id: &WorkloadId,
        spec: &WorkloadSpec,
        expected: VersionToken,
    ) -> StateResult<VersionToken> {
        if spec.id != *id {
            return Err(StateError::InvalidSpec(format!(
                "spec for {} written to {id}",
                spec.id
            )));
        }

        let key = id.key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let outcome = {
            let mut table = txn.open_table(WORKLOADS).map_err(map_err!(Table))?;
            let current: Option<Versioned<WorkloadSpec>> =
                match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => Some(
                        serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?,
                    ),
                    None => None,
                };

            match current {
                None => Err(StateError::NotFound(key.clone())),
                Some(current) if current.version != expected => Err(StateError::VersionConflict {
                    key: key.clone(),
                    expected,
                    actual: current.version,
                }),
                Some(current) => {
                    let mut value = spec.clone();
                    value.updated_at = epoch_secs();
                    let record = Versioned {
                        value,
                        version: current.version.next(),
                    };
                    let bytes = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
                    table
                        .insert(key.as_str(), bytes.as_slice())
                        .map_err(map_err!(Write))?;
                    Ok(record.version)
                }
            }
        };

        match outcome {
            Ok(version) => {
                txn.commit().map_err(map_err!(Transaction))?;
                debug!(%key, %version, "workload updated");
                Ok(version)
            }
            Err(e) => {
                txn.abort().map_err(map_err!(Transaction))?;
                debug!(%key, error = %e, "workload update rejected");
                Err(e)
            }
        }
    }

    // ── Instances ──────────────────────────────────────────────────

    /// Insert or update an instance record.
    pub fn put_instance(&self, instance: &Instance) -> StateResult<()> {
        let key = instance.table_key();
        let mut record = instance.clone();
        record.updated_at = epoch_secs();
        let value = serde_json::to_vec(&record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Get an instance by its `{namespace}/{name}` key.
    pub fn get_instance(&self, key: &str) -> StateResult<Option<Instance>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let instance: Instance =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(instance))
            }
            None => Ok(None),
        }
    }

    /// List all instances whose labels select them into `workload`.
    pub fn list_instances_for_workload(&self, workload: &WorkloadId) -> StateResult<Vec<Instance>> {
        let prefix = format!("{}/", workload.namespace);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if key.value().starts_with(&prefix) {
                let instance: Instance =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                if instance.belongs_to(workload) {
                    results.push(instance);
                }
            }
        }
        Ok(results)
    }

    /// Delete an instance by key. Returns true if it existed.
    pub fn delete_instance(&self, key: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(INSTANCES).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

#[async_trait]
impl WorkloadStore for StateStore {
    async fn get_desired_state(&self, id: &WorkloadId) -> StateResult<Versioned<WorkloadSpec>> {
        self.get_workload(id)?
            .ok_or_else(|| StateError::NotFound(id.key()))
    }

    async fn update_desired_state(
        &self,
        id: &WorkloadId,
        spec: &WorkloadSpec,
        version: VersionToken,
    ) -> StateResult<VersionToken> {
        self.compare_and_swap(id, spec, version)
    }
}

#[async_trait]
impl InstanceObserver for StateStore {
    async fn list_instances(&self, id: &WorkloadId) -> StateResult<Vec<Instance>> {
        self.list_instances_for_workload(id)
    }
}

fn epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
