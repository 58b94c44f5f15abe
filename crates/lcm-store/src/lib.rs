//! # lcm-store
//!
//! The Ledger Store: the relational tables shared by the active-context list
//! and the summary DAG.
//!
//! - **Connection pool**: `r2d2` + `rusqlite` with pragmas applied per connection
//! - **Migrations**: embedded, version-tracked, idempotent against a ledger the
//!   agent runtime already created
//! - **Repositories**: stateless structs whose methods take `&Connection`, so
//!   they run equally against a pooled connection or an open transaction
//! - **Ordinals**: the two-phase renumbering primitive and the contiguity check
//!   that guard the `(conversation_id, ordinal)` invariant

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;
pub mod ordinals;
pub mod repositories;
mod row_helpers;
pub mod row_types;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod fixtures;

pub use connection::{
    ConnectionConfig, ConnectionPool, PooledConnection, new_file, new_in_memory, open_existing,
};
pub use errors::{ErrorCategory, LedgerError, Result};
pub use migrations::{current_version, latest_version, missing_tables, run_migrations};
pub use ordinals::{ContiguityReport, check_contiguity, ensure_contiguous, shift_ordinals};
