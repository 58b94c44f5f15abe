//! Summary repository: summary rows and both kinds of edges.
//!
//! `summary_parents(summary_id, parent_summary_id)` stores one row per
//! condensation input: `summary_id` is the condensed summary and
//! `parent_summary_id` one of the summaries it was built from.

use rusqlite::{Connection, OptionalExtension, params};

use lcm_core::{ConversationId, MessageId, SummaryId, SummaryKind};

use crate::errors::Result;
use crate::row_helpers;
use crate::row_types::{MessageEdgeRow, ParentEdgeRow, ParentLink, SummaryRow};

const TABLE: &str = "summaries";
const COLUMNS: &str =
    "s.summary_id, s.conversation_id, s.kind, s.depth, s.content, s.token_count, s.file_ids, s.created_at";

/// Summary repository.
pub struct SummaryRepo;

impl SummaryRepo {
    /// Get a summary by ID, regardless of owner.
    pub fn get(conn: &Connection, summary_id: &SummaryId) -> Result<Option<SummaryRow>> {
        let sql = format!("SELECT {COLUMNS} FROM summaries s WHERE s.summary_id = ?1");
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        rows.next()?.map(|row| Self::map_row_at(row, 0)).transpose()
    }

    /// Whether any summary, in any conversation, has this ID.
    pub fn exists(conn: &Connection, summary_id: &SummaryId) -> Result<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM summaries WHERE summary_id = ?1",
                params![summary_id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// All summaries owned by a conversation, oldest first.
    pub fn list_for_conversation(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<Vec<SummaryRow>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM summaries s
             WHERE s.conversation_id = ?1
             ORDER BY s.created_at ASC, s.summary_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![conversation_id])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::map_row_at(row, 0)?);
        }
        Ok(results)
    }

    /// Parent edges whose condensed summary belongs to the conversation.
    pub fn parent_edges_for_conversation(
        conn: &Connection,
        conversation_id: ConversationId,
    ) -> Result<Vec<ParentEdgeRow>> {
        let mut stmt = conn.prepare(
            "SELECT sp.summary_id, sp.parent_summary_id, sp.ordinal
             FROM summary_parents sp
             JOIN summaries s ON s.summary_id = sp.summary_id
             WHERE s.conversation_id = ?1
             ORDER BY sp.summary_id ASC, sp.ordinal ASC",
        )?;
        let mut rows = stmt.query(params![conversation_id])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::map_parent_edge(row)?);
        }
        Ok(results)
    }

    /// Parent edges of one summary, by edge ordinal.
    pub fn parent_edges_of(conn: &Connection, summary_id: &SummaryId) -> Result<Vec<ParentEdgeRow>> {
        let mut stmt = conn.prepare(
            "SELECT sp.summary_id, sp.parent_summary_id, sp.ordinal
             FROM summary_parents sp
             WHERE sp.summary_id = ?1
             ORDER BY sp.ordinal ASC",
        )?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(Self::map_parent_edge(row)?);
        }
        Ok(results)
    }

    /// Parent summaries of one summary joined with their edges, by edge ordinal.
    ///
    /// Edges whose parent row is missing are not returned; compare against
    /// [`parent_edges_of`](Self::parent_edges_of) to detect them.
    pub fn parents_of(conn: &Connection, summary_id: &SummaryId) -> Result<Vec<ParentLink>> {
        let sql = format!(
            "SELECT sp.ordinal, {COLUMNS}
             FROM summary_parents sp
             JOIN summaries s ON s.summary_id = sp.parent_summary_id
             WHERE sp.summary_id = ?1
             ORDER BY sp.ordinal ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            results.push(ParentLink {
                ordinal: row_helpers::get(row, 0, "summary_parents", "ordinal")?,
                summary: Self::map_row_at(row, 1)?,
            });
        }
        Ok(results)
    }

    /// Summaries, in any conversation, that list this summary as a parent.
    pub fn children_of(conn: &Connection, summary_id: &SummaryId) -> Result<Vec<SummaryId>> {
        let mut stmt = conn.prepare(
            "SELECT summary_id FROM summary_parents
             WHERE parent_summary_id = ?1
             ORDER BY summary_id ASC",
        )?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row_helpers::get(row, 0, "summary_parents", "summary_id")?;
            results.push(SummaryId::from(id));
        }
        Ok(results)
    }

    /// Message edges of one summary, by edge ordinal.
    pub fn message_edges_of(conn: &Connection, summary_id: &SummaryId) -> Result<Vec<MessageEdgeRow>> {
        let mut stmt = conn.prepare(
            "SELECT summary_id, message_id, ordinal
             FROM summary_messages
             WHERE summary_id = ?1
             ORDER BY ordinal ASC",
        )?;
        let mut rows = stmt.query(params![summary_id.as_str()])?;
        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row_helpers::get(row, 0, "summary_messages", "summary_id")?;
            results.push(MessageEdgeRow {
                summary_id: SummaryId::from(id),
                message_id: row_helpers::get(row, 1, "summary_messages", "message_id")?,
                ordinal: row_helpers::get(row, 2, "summary_messages", "ordinal")?,
            });
        }
        Ok(results)
    }

    /// Insert a summary row as given.
    pub fn insert(conn: &Connection, summary: &SummaryRow) -> Result<()> {
        let file_ids = serde_json::to_string(&summary.file_ids)?;
        let _ = conn.execute(
            "INSERT INTO summaries
               (summary_id, conversation_id, kind, depth, content, token_count, file_ids, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                summary.summary_id.as_str(),
                summary.conversation_id,
                summary.kind.as_str(),
                summary.depth,
                summary.content,
                summary.token_count,
                file_ids,
                summary.created_at,
            ],
        )?;
        Ok(())
    }

    /// Link `summary_id` to one of its parents.
    pub fn insert_parent_edge(
        conn: &Connection,
        summary_id: &SummaryId,
        parent_summary_id: &SummaryId,
        ordinal: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO summary_parents (summary_id, parent_summary_id, ordinal) VALUES (?1, ?2, ?3)",
            params![summary_id.as_str(), parent_summary_id.as_str(), ordinal],
        )?;
        Ok(())
    }

    /// Link a summary to one of its source messages.
    pub fn insert_message_edge(
        conn: &Connection,
        summary_id: &SummaryId,
        message_id: MessageId,
        ordinal: i64,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO summary_messages (summary_id, message_id, ordinal) VALUES (?1, ?2, ?3)",
            params![summary_id.as_str(), message_id, ordinal],
        )?;
        Ok(())
    }

    /// Delete the parent edges of a summary. Returns rows deleted.
    pub fn delete_parent_edges(conn: &Connection, summary_id: &SummaryId) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM summary_parents WHERE summary_id = ?1",
            params![summary_id.as_str()],
        )?)
    }

    /// Delete the message edges of a summary. Returns rows deleted.
    pub fn delete_message_edges(conn: &Connection, summary_id: &SummaryId) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM summary_messages WHERE summary_id = ?1",
            params![summary_id.as_str()],
        )?)
    }

    /// Delete the summary row itself. Returns rows deleted.
    pub fn delete(conn: &Connection, summary_id: &SummaryId) -> Result<usize> {
        Ok(conn.execute(
            "DELETE FROM summaries WHERE summary_id = ?1",
            params![summary_id.as_str()],
        )?)
    }

    fn map_row_at(row: &rusqlite::Row<'_>, base: usize) -> Result<SummaryRow> {
        let id: String = row_helpers::get(row, base, TABLE, "summary_id")?;
        let kind: String = row_helpers::get(row, base + 2, TABLE, "kind")?;
        let file_ids: Option<String> = row_helpers::get(row, base + 6, TABLE, "file_ids")?;
        Ok(SummaryRow {
            summary_id: SummaryId::from(id),
            conversation_id: row_helpers::get(row, base + 1, TABLE, "conversation_id")?,
            kind: row_helpers::parse_enum::<SummaryKind>(&kind, TABLE, "kind")?,
            depth: row_helpers::get(row, base + 3, TABLE, "depth")?,
            content: row_helpers::get(row, base + 4, TABLE, "content")?,
            token_count: row_helpers::get(row, base + 5, TABLE, "token_count")?,
            file_ids: row_helpers::parse_string_list(
                file_ids.as_deref().unwrap_or_default(),
                TABLE,
                "file_ids",
            )?,
            created_at: row_helpers::get(row, base + 7, TABLE, "created_at")?,
        })
    }

    fn map_parent_edge(row: &rusqlite::Row<'_>) -> Result<ParentEdgeRow> {
        let child: String = row_helpers::get(row, 0, "summary_parents", "summary_id")?;
        let parent: String = row_helpers::get(row, 1, "summary_parents", "parent_summary_id")?;
        Ok(ParentEdgeRow {
            summary_id: SummaryId::from(child),
            parent_summary_id: SummaryId::from(parent),
            ordinal: row_helpers::get(row, 2, "summary_parents", "ordinal")?,
        })
    }
}
