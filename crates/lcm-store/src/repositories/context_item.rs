//! Context item repository: the ordered active context of a conversation.
//!
//! Renumbering lives in [`crate::ordinals`]; this module only reads, inserts
//! and deletes single items.

use rusqlite::{Connection, params};

use lcm_core::{ContextItemType, ConversationId, MessageId, SummaryId};

use crate::errors::Result;
use crate::row_helpers;
use crate::row_types::{ContextEntry, ContextItemRow};

const TABLE: &str = "context_items";

/// Context item repository.
pub struct ContextItemRepo;

impl ContextItemRepo {
    /// All items of a conversation in ordinal order.
    pub fn list(conn: &Connection, conversation_id: ConversationId) -> Result<Vec<ContextItemRow>> {
        let mut stmt = conn.prepare(
            "SELECT ci.conversation_id, ci.ordinal, ci.item_type, ci.message_id, ci.summary_id, ci.created_at
             FROM context_items ci
             WHERE ci.conversation_id = ?1
             ORDER BY ci.ordinal ASC",
        )?;
        let mut rows = stmt.query(params![conversation_id])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::map_row(row)?);
        }
        Ok(results)
    }

    /// All items with the token count of the referenced message or summary.
    pub fn list_with_tokens(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<Vec<ContextEntry>> {
        let mut stmt = conn.prepare(
            "SELECT ci.conversation_id, ci.ordinal, ci.item_type, ci.message_id, ci.summary_id, ci.created_at,
                    COALESCE(s.token_count, m.token_count, 0)
             FROM context_items ci
             LEFT JOIN summaries s ON s.summary_id = ci.summary_id
             LEFT JOIN messages m ON m.message_id = ci.message_id
             WHERE ci.conversation_id = ?1
             ORDER BY ci.ordinal ASC",
        )?;
        let mut rows = stmt.query(params![conversation_id])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(ContextEntry {
                item: Self::map_row(row)?,
                token_count: row_helpers::get(row, 6, TABLE, "token_count")?,
            });
        }
        Ok(results)
    }

    /// Summary-type items of a conversation in ordinal order.
    pub fn summary_items(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<Vec<ContextItemRow>> {
        Ok(Self::list(conn, conversation_id)?
            .into_iter()
            .filter(|item| item.item_type == ContextItemType::Summary)
            .collect())
    }

    /// Number of items in a conversation.
    pub fn count(conn: &Connection, conversation_id: ConversationId) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM context_items WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )?)
    }

    /// Number of items strictly after `ordinal`.
    pub fn count_after(
        conn: &Connection,
        conversation_id: ConversationId,
        ordinal: i64,
    ) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM context_items WHERE conversation_id = ?1 AND ordinal > ?2",
            params![conversation_id, ordinal],
            |row| row.get(0),
        )?)
    }

    /// Ordinals at which a summary sits in one conversation's context.
    pub fn ordinals_of_summary(
        conn: &Connection,
        conversation_id: ConversationId,
        summary_id: &SummaryId,
    ) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT ordinal FROM context_items
             WHERE conversation_id = ?1 AND summary_id = ?2
             ORDER BY ordinal ASC",
        )?;
        let ordinals = stmt
            .query_map(params![conversation_id, summary_id.as_str()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ordinals)
    }

    /// Context items in any conversation that reference a summary.
    pub fn count_summary_references(conn: &Connection, summary_id: &SummaryId) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM context_items WHERE summary_id = ?1",
            params![summary_id.as_str()],
            |row| row.get(0),
        )?)
    }

    /// Insert a summary item at `ordinal`.
    pub fn insert_summary(
        conn: &Connection,
        conversation_id: ConversationId,
        ordinal: i64,
        summary_id: &SummaryId,
        created_at: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO context_items (conversation_id, ordinal, item_type, summary_id, created_at)
             VALUES (?1, ?2, 'summary', ?3, ?4)",
            params![conversation_id, ordinal, summary_id.as_str(), created_at],
        )?;
        Ok(())
    }

    /// Insert a message item at `ordinal`.
    pub fn insert_message(
        conn: &Connection,
        conversation_id: ConversationId,
        ordinal: i64,
        message_id: MessageId,
        created_at: &str,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO context_items (conversation_id, ordinal, item_type, message_id, created_at)
             VALUES (?1, ?2, 'message', ?3, ?4)",
            params![conversation_id, ordinal, message_id, created_at],
        )?;
        Ok(())
    }

    /// Delete the item at `ordinal` only if it references `summary_id`.
    /// Returns rows deleted.
    pub fn delete_summary_at(
        conn: &Connection,
        conversation_id: ConversationId,
        ordinal: i64,
        summary_id: &SummaryId,
    ) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM context_items
             WHERE conversation_id = ?1 AND ordinal = ?2 AND summary_id = ?3",
            params![conversation_id, ordinal, summary_id.as_str()],
        )?)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> Result<ContextItemRow> {
        let item_type: String = row_helpers::get(row, 2, TABLE, "item_type")?;
        let summary_id: Option<String> = row_helpers::get(row, 4, TABLE, "summary_id")?;
        Ok(ContextItemRow {
            conversation_id: row_helpers::get(row, 0, TABLE, "conversation_id")?,
            ordinal: row_helpers::get(row, 1, TABLE, "ordinal")?,
            item_type: row_helpers::parse_enum(&item_type, TABLE, "item_type")?,
            message_id: row_helpers::get(row, 3, TABLE, "message_id")?,
            summary_id: summary_id.map(SummaryId::from),
            created_at: row_helpers::get(row, 5, TABLE, "created_at")?,
        })
    }
}
