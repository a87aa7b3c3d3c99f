//! redb table definitions for the rollguard state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Versioned workload records keyed by `{namespace}/{name}`.
pub const WORKLOADS: TableDefinition<&str, &[u8]> = TableDefinition::new("workloads");

/// Instance state keyed by `{namespace}/{instance_name}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");
