//! Database row types for the ledger tables.
//!
//! These mirror the raw row shape. Enum and JSON columns are decoded on the
//! way out of the repository layer, so a malformed value surfaces as
//! [`LedgerError::CorruptRow`](crate::errors::LedgerError::CorruptRow)
//! instead of reaching the engines.

use lcm_core::{ContextItemType, ConversationId, MessageId, SummaryId, SummaryKind};
use serde::Serialize;

/// Row from the `conversations` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationRow {
    /// Conversation ID.
    pub conversation_id: ConversationId,
    /// External session this conversation belongs to.
    pub session_id: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Last update timestamp.
    pub updated_at: String,
}

/// A conversation with its ledger sizes, for listings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationOverview {
    /// The conversation row.
    #[serde(flatten)]
    pub conversation: ConversationRow,
    /// Summaries owned by the conversation.
    pub summary_count: i64,
    /// Items in its active context.
    pub context_item_count: i64,
}

/// Row from the `messages` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageRow {
    /// Message ID.
    pub message_id: MessageId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Author role (`user`, `assistant`, `tool`, ...).
    pub role: String,
    /// Raw content.
    pub content: String,
    /// Token count.
    pub token_count: i64,
    /// Creation timestamp.
    pub created_at: String,
}

/// Row from the `summaries` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    /// Summary ID.
    pub summary_id: SummaryId,
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Leaf or condensed.
    pub kind: SummaryKind,
    /// 0 for leaves, 1 + max(parent depth) for condensed summaries.
    pub depth: i64,
    /// Summary text.
    pub content: String,
    /// Token count.
    pub token_count: i64,
    /// Opaque file identifiers attached by the runtime.
    pub file_ids: Vec<String>,
    /// Creation timestamp.
    pub created_at: String,
}

/// Row from the `summary_parents` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentEdgeRow {
    /// The condensed summary.
    pub summary_id: SummaryId,
    /// One of the summaries it was condensed from.
    pub parent_summary_id: SummaryId,
    /// Position of the parent in the child's parent list.
    pub ordinal: i64,
}

/// Row from the `summary_messages` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MessageEdgeRow {
    /// The leaf summary.
    pub summary_id: SummaryId,
    /// One of its source messages.
    pub message_id: MessageId,
    /// Position of the message in the summary's sources.
    pub ordinal: i64,
}

/// A parent summary joined with the edge that links it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParentLink {
    /// Edge ordinal.
    pub ordinal: i64,
    /// The parent summary.
    pub summary: SummaryRow,
}

/// Row from the `context_items` table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextItemRow {
    /// Owning conversation.
    pub conversation_id: ConversationId,
    /// Position in the active context.
    pub ordinal: i64,
    /// What the item points at.
    pub item_type: ContextItemType,
    /// Referenced message, for message items.
    pub message_id: Option<MessageId>,
    /// Referenced summary, for summary items.
    pub summary_id: Option<SummaryId>,
    /// Creation timestamp.
    pub created_at: String,
}

/// A context item with the token count of whatever it references.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    /// The context item row.
    #[serde(flatten)]
    pub item: ContextItemRow,
    /// Tokens of the referenced message or summary.
    pub token_count: i64,
}

/// Totals over a conversation's active context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ContextTotals {
    /// Summary items.
    pub summaries: usize,
    /// Message items.
    pub messages: usize,
    /// Tokens across all items.
    pub tokens: i64,
}

impl ContextTotals {
    /// Sum up a context listing.
    pub fn of(entries: &[ContextEntry]) -> Self {
        entries.iter().fold(Self::default(), |mut acc, entry| {
            match entry.item.item_type {
                ContextItemType::Summary => acc.summaries += 1,
                ContextItemType::Message => acc.messages += 1,
            }
            acc.tokens += entry.token_count;
            acc
        })
    }
}
