//! Ledger identifiers.
//!
//! Summaries carry globally unique string IDs of the form `sum_` followed by
//! 16 lowercase hex characters. Conversations and messages are plain `SQLite`
//! row ids owned by the agent runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Row id of a conversation (`conversations.conversation_id`).
pub type ConversationId = i64;

/// Row id of a message (`messages.message_id`).
pub type MessageId = i64;

/// Fixed prefix of every summary ID.
pub const SUMMARY_ID_PREFIX: &str = "sum_";

/// Number of hex characters after the prefix.
pub const SUMMARY_ID_HEX_LEN: usize = 16;

/// Unique identifier for a summary node.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SummaryId(String);

impl SummaryId {
    /// Mint a new random ID from 64 random bits.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("{SUMMARY_ID_PREFIX}{:016x}", rand::random::<u64>()))
    }

    /// Create from an existing string value.
    #[must_use]
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume self and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Whether the ID has the `sum_` + 16 lowercase hex shape.
    ///
    /// IDs read back from the store are accepted as opaque strings; this is
    /// only enforced on IDs this crate mints.
    pub fn is_well_formed(&self) -> bool {
        self.0.strip_prefix(SUMMARY_ID_PREFIX).is_some_and(|hex| {
            hex.len() == SUMMARY_ID_HEX_LEN
                && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
    }
}

impl std::ops::Deref for SummaryId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SummaryId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SummaryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SummaryId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SummaryId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<SummaryId> for String {
    fn from(id: SummaryId) -> Self {
        id.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
