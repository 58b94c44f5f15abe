//! Message repository. Messages are write-once; nothing here mutates them.

use rusqlite::{Connection, params};

use lcm_core::{MessageId, SummaryId};

use crate::errors::Result;
use crate::row_helpers;
use crate::row_types::MessageRow;

const TABLE: &str = "messages";

/// Message repository.
pub struct MessageRepo;

impl MessageRepo {
    /// Get a message by ID.
    pub fn get(conn: &Connection, message_id: MessageId) -> Result<Option<MessageRow>> {
        let mut stmt = conn.prepare(
            "SELECT m.message_id, m.conversation_id, m.role, m.content, m.token_count, m.created_at
             FROM messages m WHERE m.message_id = ?1",
        )?;
        let mut rows = stmt.query(params![message_id])?;
        rows.next()?.map(Self::map_row).transpose()
    }

    /// Source messages of a summary, in edge order.
    ///
    /// The messages may belong to another conversation when the summary was
    /// transplanted.
    pub fn sources_of(conn: &Connection, summary_id: &SummaryId) -> Result<Vec<MessageRow>> {
        let mut stmt = conn.prepare(
            "SELECT m.message_id, m.conversation_id, m.role, m.content, m.token_count, m.created_at
             FROM summary_messages sm
             JOIN messages m ON m.message_id = sm.message_id
             WHERE sm.summary_id = ?1
             ORDER BY sm.ordinal ASC",
        )?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::map_row(row)?);
        }
        Ok(results)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> Result<MessageRow> {
        Ok(MessageRow {
            message_id: row_helpers::get(row, 0, TABLE, "message_id")?,
            conversation_id: row_helpers::get(row, 1, TABLE, "conversation_id")?,
            role: row_helpers::get(row, 2, TABLE, "role")?,
            content: row_helpers::get(row, 3, TABLE, "content")?,
            token_count: row_helpers::get(row, 4, TABLE, "token_count")?,
            created_at: row_helpers::get(row, 5, TABLE, "created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::LedgerBuilder;

    #[test]
    fn get_message() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let id = ledger.message(conv, "assistant", "hello", 4);

        let row = MessageRepo::get(ledger.conn(), id).unwrap().unwrap();
        assert_eq!(row.role, "assistant");
        assert_eq!(row.content, "hello");
        assert_eq!(row.token_count, 4);
        assert!(MessageRepo::get(ledger.conn(), id + 100).unwrap().is_none());
    }

    #[test]
    fn sources_follow_edge_order() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let first = ledger.message(conv, "user", "first", 1);
        let second = ledger.message(conv, "assistant", "second", 1);
        let leaf = ledger.leaf(conv, "leaf", 5, &[second, first]);

        let sources = MessageRepo::sources_of(ledger.conn(), &leaf).unwrap();
        let contents: Vec<&str> = sources.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["second", "first"]);
    }

    #[test]
    fn sources_of_unknown_summary_is_empty() {
        let ledger = LedgerBuilder::new();
        let sources = MessageRepo::sources_of(ledger.conn(), &SummaryId::from("sum_ffffffffffffffff")).unwrap();
        assert!(sources.is_empty());
    }
}
