//! Enumerations stored as lowercase strings in the ledger tables.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a summary node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryKind {
    /// Produced directly from raw messages; has message edges, no parents.
    Leaf,
    /// Produced by compacting other summaries; has parent edges.
    Condensed,
}

impl SummaryKind {
    /// Wire string as stored in `summaries.kind`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Condensed => "condensed",
        }
    }
}

impl fmt::Display for SummaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for SummaryKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leaf" => Ok(Self::Leaf),
            "condensed" => Ok(Self::Condensed),
            other => Err(format!("unknown summary kind: {other}")),
        }
    }
}

/// What a context item points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextItemType {
    /// A raw message.
    Message,
    /// A summary node.
    Summary,
}

impl ContextItemType {
    /// Wire string as stored in `context_items.item_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Summary => "summary",
        }
    }
}

impl fmt::Display for ContextItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ContextItemType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message" => Ok(Self::Message),
            "summary" => Ok(Self::Summary),
            other => Err(format!("unknown context item type: {other}")),
        }
    }
}
