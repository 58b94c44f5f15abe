//! Error types for the ledger store and the engines built on it.
//!
//! [`LedgerError`] is returned by every store, graph, dissolve and transplant
//! operation. [`LedgerError::category`] folds the variants into the four
//! failure classes operators reason about, plus raw storage failures.

use lcm_core::{ConversationId, SummaryId, SummaryKind};
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during ledger operations.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// A stored value could not be decoded.
    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        /// Table the row came from.
        table: &'static str,
        /// Offending column.
        column: &'static str,
        /// Decoder message.
        detail: String,
    },

    /// No ledger database exists at the path.
    #[error("ledger database not found: {0}")]
    DatabaseNotFound(String),

    /// Requested conversation was not found.
    #[error("conversation not found: {0}")]
    ConversationNotFound(ConversationId),

    /// No conversation belongs to the external session.
    #[error("no conversation found for session {0:?}")]
    SessionNotFound(String),

    /// Requested summary was not found.
    #[error("summary not found: {0}")]
    SummaryNotFound(SummaryId),

    /// The summary does not occupy a slot in the conversation's context.
    #[error("summary {summary_id} not found in active context for conversation {conversation_id}")]
    NotInActiveContext {
        /// Summary that was asked for.
        summary_id: SummaryId,
        /// Conversation whose context was searched.
        conversation_id: ConversationId,
    },

    /// Only condensed summaries can be dissolved.
    #[error(
        "summary {summary_id} is a {kind} (depth {depth}), not condensed; only condensed summaries can be dissolved"
    )]
    NotCondensable {
        /// Summary that was asked for.
        summary_id: SummaryId,
        /// Its actual kind.
        kind: SummaryKind,
        /// Its stored depth.
        depth: i64,
    },

    /// A condensed summary with zero parent edges.
    #[error("summary {0} has no parent summaries; nothing to dissolve")]
    NothingToDissolve(SummaryId),

    /// Any other precondition checked before mutation.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The operation would duplicate work already present in the ledger.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An invariant check failed; the enclosing transaction is rolled back.
    #[error("integrity violation: {0}")]
    Integrity(String),
}

/// Failure classes of [`LedgerError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Conversation, summary or context item does not exist.
    NotFound,
    /// Wrong kind, zero parents, stale position and similar.
    Precondition,
    /// Apparent duplicate of an earlier operation.
    Conflict,
    /// Invariant broken mid-operation or stored data undecodable.
    Integrity,
    /// The database or pool itself failed.
    Storage,
}

impl LedgerError {
    /// Failure class of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::DatabaseNotFound(_)
            | Self::ConversationNotFound(_)
            | Self::SessionNotFound(_)
            | Self::SummaryNotFound(_) => ErrorCategory::NotFound,
            Self::NotInActiveContext { .. }
            | Self::NotCondensable { .. }
            | Self::NothingToDissolve(_)
            | Self::Precondition(_) => ErrorCategory::Precondition,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Integrity(_) | Self::CorruptRow { .. } => ErrorCategory::Integrity,
            Self::Sqlite(_) | Self::Pool(_) | Self::Serde(_) | Self::Migration { .. } => {
                ErrorCategory::Storage
            }
        }
    }
}

/// Convenience type alias for ledger results.
pub type Result<T> = std::result::Result<T, LedgerError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
