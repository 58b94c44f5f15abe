//! Collaborators the mutation engines consume.
//!
//! Timestamps and freshly minted summary IDs come from injected providers so
//! tests can pin both.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::ids::SummaryId;

/// Timestamp format written by `SQLite`'s `datetime('now')`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Source of `created_at` stamps.
pub trait Clock {
    /// Current UTC time, formatted as [`TIMESTAMP_FORMAT`].
    fn now(&self) -> String;
}

/// Wall-clock UTC time.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> String {
        chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Clock that always returns the same instant.
#[derive(Clone, Debug)]
pub struct FixedClock(pub String);

impl Clock for FixedClock {
    fn now(&self) -> String {
        self.0.clone()
    }
}

/// Generator of new summary IDs.
pub trait IdSource {
    /// Produce a candidate ID. Callers re-draw on collision.
    fn next_summary_id(&self) -> SummaryId;
}

/// Random `sum_` + 16 hex IDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIds;

impl IdSource for RandomIds {
    fn next_summary_id(&self) -> SummaryId {
        SummaryId::generate()
    }
}

/// Hands out a scripted sequence of IDs, then falls back to random ones.
#[derive(Debug, Default)]
pub struct ScriptedIds {
    queue: RefCell<VecDeque<SummaryId>>,
}

impl ScriptedIds {
    /// Queue the given IDs in order.
    pub fn new(ids: impl IntoIterator<Item = SummaryId>) -> Self {
        Self {
            queue: RefCell::new(ids.into_iter().collect()),
        }
    }

    /// Number of scripted IDs not yet handed out.
    pub fn remaining(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl IdSource for ScriptedIds {
    fn next_summary_id(&self) -> SummaryId {
        self.queue
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(SummaryId::generate)
    }
}
