//! Conversation repository: lookups and listings.
//!
//! Conversations are created by the agent runtime; this repository only reads.

use rusqlite::{Connection, OptionalExtension, params};

use lcm_core::ConversationId;

use crate::errors::{LedgerError, Result};
use crate::row_helpers;
use crate::row_types::{ConversationOverview, ConversationRow};

const TABLE: &str = "conversations";

/// Conversation repository.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Get a conversation by ID.
    pub fn get(conn: &Connection, conversation_id: ConversationId) -> Result<Option<ConversationRow>> {
        let mut stmt = conn.prepare(
            "SELECT conversation_id, session_id, created_at, updated_at
             FROM conversations WHERE conversation_id = ?1",
        )?;
        let mut rows = stmt.query(params![conversation_id])?;
        rows.next()?.map(Self::map_row).transpose()
    }

    /// Get a conversation by ID, failing with `ConversationNotFound`.
    pub fn require(conn: &Connection, conversation_id: ConversationId) -> Result<ConversationRow> {
        Self::get(conn, conversation_id)?.ok_or(LedgerError::ConversationNotFound(conversation_id))
    }

    /// Whether a conversation exists.
    pub fn exists(conn: &Connection, conversation_id: ConversationId) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Most recently updated conversation for an external session.
    pub fn latest_for_session(conn: &Connection, session_id: &str) -> Result<Option<ConversationRow>> {
        let mut stmt = conn.prepare(
            "SELECT conversation_id, session_id, created_at, updated_at
             FROM conversations WHERE session_id = ?1
             ORDER BY updated_at DESC, conversation_id DESC
             LIMIT 1",
        )?;
        let mut rows = stmt.query(params![session_id])?;
        rows.next()?.map(Self::map_row).transpose()
    }

    /// All conversations with their summary and context item counts,
    /// most recently updated first.
    pub fn list_overview(conn: &Connection) -> Result<Vec<ConversationOverview>> {
        let mut stmt = conn.prepare(
            "SELECT c.conversation_id, c.session_id, c.created_at, c.updated_at,
                    (SELECT COUNT(*) FROM summaries s WHERE s.conversation_id = c.conversation_id),
                    (SELECT COUNT(*) FROM context_items ci WHERE ci.conversation_id = c.conversation_id)
             FROM conversations c
             ORDER BY c.updated_at DESC, c.conversation_id DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(ConversationOverview {
                conversation: Self::map_row(row)?,
                summary_count: row_helpers::get(row, 4, TABLE, "summary_count")?,
                context_item_count: row_helpers::get(row, 5, TABLE, "context_item_count")?,
            });
        }
        Ok(results)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> Result<ConversationRow> {
        Ok(ConversationRow {
            conversation_id: row_helpers::get(row, 0, TABLE, "conversation_id")?,
            session_id: row_helpers::get(row, 1, TABLE, "session_id")?,
            created_at: row_helpers::get(row, 2, TABLE, "created_at")?,
            updated_at: row_helpers::get(row, 3, TABLE, "updated_at")?,
        })
    }
}
