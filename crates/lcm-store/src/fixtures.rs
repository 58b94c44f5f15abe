//! Ledger builders for tests.
//!
//! The ledger core never creates conversations or messages, so tests build
//! them here with plain SQL. Timestamps and summary IDs come from a shared
//! counter: every row created later sorts later, and IDs are predictable
//! (`sum_0000000000000001`, `sum_0000000000000002`, ...).

#![allow(clippy::missing_panics_doc, missing_docs)]

use std::cell::Cell;

use rusqlite::{Connection, params};

use lcm_core::{ConversationId, MessageId, SummaryId, SummaryKind};

use crate::migrations::run_migrations;
use crate::repositories::{ContextItemRepo, SummaryRepo};
use crate::row_types::{ContextItemRow, MessageEdgeRow, ParentEdgeRow, SummaryRow};

/// An in-memory, migrated ledger plus helpers that insert rows into it.
pub struct LedgerBuilder {
    conn: Connection,
    tick: Cell<u32>,
}

impl Default for LedgerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerBuilder {
    pub fn new() -> Self {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let _ = run_migrations(&conn).unwrap();
        Self {
            conn,
            tick: Cell::new(0),
        }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Next timestamp in the fixture's monotonic clock.
    pub fn stamp(&self) -> String {
        let n = self.tick.get() + 1;
        self.tick.set(n);
        format!("2026-01-01 {:02}:{:02}:{:02}", n / 3600, (n / 60) % 60, n % 60)
    }

    fn next_summary_id(&self) -> SummaryId {
        let n = self.tick.get() + 1;
        self.tick.set(n);
        SummaryId::from(format!("sum_{n:016x}"))
    }

    pub fn conversation(&self, session_id: &str) -> ConversationId {
        let stamp = self.stamp();
        let _ = self
            .conn
            .execute(
                "INSERT INTO conversations (session_id, created_at, updated_at) VALUES (?1, ?2, ?2)",
                params![session_id, stamp],
            )
            .unwrap();
        self.conn.last_insert_rowid()
    }

    pub fn message(
        &self,
        conversation_id: ConversationId,
        role: &str,
        content: &str,
        token_count: i64,
    ) -> MessageId {
        let stamp = self.stamp();
        let _ = self
            .conn
            .execute(
                "INSERT INTO messages (conversation_id, role, content, token_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![conversation_id, role, content, token_count, stamp],
            )
            .unwrap();
        self.conn.last_insert_rowid()
    }

    /// Insert a leaf summary with message edges in the given order.
    pub fn leaf(
        &self,
        conversation_id: ConversationId,
        content: &str,
        token_count: i64,
        messages: &[MessageId],
    ) -> SummaryId {
        let id = self.next_summary_id();
        self.insert_summary(&SummaryRow {
            summary_id: id.clone(),
            conversation_id,
            kind: SummaryKind::Leaf,
            depth: 0,
            content: content.to_string(),
            token_count,
            file_ids: Vec::new(),
            created_at: self.stamp(),
        });
        for (ordinal, message_id) in (0_i64..).zip(messages) {
            SummaryRepo::insert_message_edge(&self.conn, &id, *message_id, ordinal).unwrap();
        }
        id
    }

    /// Insert a condensed summary whose depth is one more than its deepest parent.
    pub fn condensed(
        &self,
        conversation_id: ConversationId,
        content: &str,
        token_count: i64,
        parents: &[&SummaryId],
    ) -> SummaryId {
        let depth = parents
            .iter()
            .map(|p| SummaryRepo::get(&self.conn, p).unwrap().map_or(0, |row| row.depth))
            .max()
            .map_or(1, |d| d + 1);
        self.condensed_at_depth(conversation_id, content, token_count, depth, parents)
    }

    /// Insert a condensed summary with an explicit depth.
    pub fn condensed_at_depth(
        &self,
        conversation_id: ConversationId,
        content: &str,
        token_count: i64,
        depth: i64,
        parents: &[&SummaryId],
    ) -> SummaryId {
        let id = self.next_summary_id();
        self.insert_summary(&SummaryRow {
            summary_id: id.clone(),
            conversation_id,
            kind: SummaryKind::Condensed,
            depth,
            content: content.to_string(),
            token_count,
            file_ids: Vec::new(),
            created_at: self.stamp(),
        });
        for (ordinal, parent) in (0_i64..).zip(parents) {
            self.link_parent(&id, parent, ordinal);
        }
        id
    }

    pub fn insert_summary(&self, row: &SummaryRow) {
        SummaryRepo::insert(&self.conn, row).unwrap();
    }

    /// Add a parent edge; also used to inject cycles.
    pub fn link_parent(&self, child: &SummaryId, parent: &SummaryId, ordinal: i64) {
        SummaryRepo::insert_parent_edge(&self.conn, child, parent, ordinal).unwrap();
    }

    /// Append a summary item at the end of the conversation's context.
    pub fn push_summary(&self, conversation_id: ConversationId, summary_id: &SummaryId) -> i64 {
        let ordinal = ContextItemRepo::count(&self.conn, conversation_id).unwrap();
        let stamp = self.stamp();
        ContextItemRepo::insert_summary(&self.conn, conversation_id, ordinal, summary_id, &stamp)
            .unwrap();
        ordinal
    }

    /// Append a message item at the end of the conversation's context.
    pub fn push_message(&self, conversation_id: ConversationId, message_id: MessageId) -> i64 {
        let ordinal = ContextItemRepo::count(&self.conn, conversation_id).unwrap();
        let stamp = self.stamp();
        ContextItemRepo::insert_message(&self.conn, conversation_id, ordinal, message_id, &stamp)
            .unwrap();
        ordinal
    }

    /// Every row the conversation owns or is linked to, in a stable order.
    pub fn snapshot(&self, conversation_id: ConversationId) -> LedgerSnapshot {
        let summaries = SummaryRepo::list_for_conversation(&self.conn, conversation_id).unwrap();
        let mut parent_edges = Vec::new();
        let mut message_edges = Vec::new();
        for summary in &summaries {
            parent_edges.extend(SummaryRepo::parent_edges_of(&self.conn, &summary.summary_id).unwrap());
            message_edges.extend(SummaryRepo::message_edges_of(&self.conn, &summary.summary_id).unwrap());
        }
        LedgerSnapshot {
            summaries,
            parent_edges,
            message_edges,
            context_items: ContextItemRepo::list(&self.conn, conversation_id).unwrap(),
        }
    }

    pub fn summary_count(&self) -> i64 {
        self.conn
            .query_row("SELECT COUNT(*) FROM summaries", [], |row| row.get(0))
            .unwrap()
    }
}

/// Full-row image of one conversation, for before/after comparisons.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub summaries: Vec<SummaryRow>,
    pub parent_edges: Vec<ParentEdgeRow>,
    pub message_edges: Vec<MessageEdgeRow>,
    pub context_items: Vec<ContextItemRow>,
}
