//! Ordinal renumbering and the contiguity check for `context_items`.
//!
//! A conversation's context items must occupy exactly the ordinals `[0, N)`.
//! Opening a gap of `shift` slots in the middle of that range cannot be done
//! with a single `UPDATE ... SET ordinal = ordinal + shift`: `SQLite` checks
//! the `(conversation_id, ordinal)` primary key row by row, and a row can land
//! on a neighbour that has not moved yet. [`shift_ordinals`] moves the rows
//! through a staging range above every live and final ordinal instead.

use rusqlite::{Connection, params};
use serde::Serialize;
use tracing::debug;

use lcm_core::ConversationId;

use crate::errors::{LedgerError, Result};

/// Result of [`check_contiguity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ContiguityReport {
    /// Number of items in the conversation.
    pub item_count: usize,
    /// First position whose ordinal is not equal to its index, if any.
    pub first_gap: Option<i64>,
}

impl ContiguityReport {
    /// Whether the ordinals are exactly `[0, item_count)`.
    pub fn is_contiguous(&self) -> bool {
        self.first_gap.is_none()
    }
}

/// Add `shift` to every ordinal `>= from_ordinal` of one conversation.
///
/// Two phases inside the caller's transaction: rows move up by a staging
/// offset of `max_ordinal + shift + 1`, then down to their final ordinal.
/// Returns the number of rows moved.
///
/// # Errors
///
/// [`LedgerError::Integrity`] for a negative shift or when the second phase
/// does not move the same rows as the first.
pub fn shift_ordinals(
    conn: &Connection,
    conversation_id: ConversationId,
    from_ordinal: i64,
    shift: i64,
) -> Result<usize> {
    if shift < 0 {
        return Err(LedgerError::Integrity(format!(
            "negative ordinal shift {shift} for conversation {conversation_id}"
        )));
    }
    if shift == 0 {
        return Ok(0);
    }

    let max_ordinal: Option<i64> = conn.query_row(
        "SELECT MAX(ordinal) FROM context_items WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;
    let Some(max_ordinal) = max_ordinal.filter(|max| *max >= from_ordinal) else {
        return Ok(0);
    };

    let staging = max_ordinal + shift + 1;
    let staged = conn.execute(
        "UPDATE context_items SET ordinal = ordinal + ?3
         WHERE conversation_id = ?1 AND ordinal >= ?2",
        params![conversation_id, from_ordinal, staging],
    )?;
    let settled = conn.execute(
        "UPDATE context_items SET ordinal = ordinal - ?3 + ?4
         WHERE conversation_id = ?1 AND ordinal >= ?2",
        params![conversation_id, from_ordinal + staging, staging, shift],
    )?;
    if staged != settled {
        return Err(LedgerError::Integrity(format!(
            "ordinal shift for conversation {conversation_id} staged {staged} rows but settled {settled}"
        )));
    }

    debug!(conversation_id, from_ordinal, shift, moved = staged, "shifted context ordinals");
    Ok(staged)
}

/// Inspect whether a conversation's ordinals form `[0, N)`.
pub fn check_contiguity(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<ContiguityReport> {
    let mut stmt = conn.prepare(
        "SELECT ordinal FROM context_items WHERE conversation_id = ?1 ORDER BY ordinal ASC",
    )?;
    let ordinals = stmt
        .query_map(params![conversation_id], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let first_gap = ordinals
        .iter()
        .zip(0_i64..)
        .find(|(ordinal, expected)| **ordinal != *expected)
        .map(|(_, expected)| expected);

    Ok(ContiguityReport {
        item_count: ordinals.len(),
        first_gap,
    })
}

/// Like [`check_contiguity`], but a broken range is an error.
///
/// # Errors
///
/// [`LedgerError::Integrity`] naming the first missing position.
pub fn ensure_contiguous(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<ContiguityReport> {
    let report = check_contiguity(conn, conversation_id)?;
    match report.first_gap {
        None => Ok(report),
        Some(gap) => Err(LedgerError::Integrity(format!(
            "context ordinals for conversation {conversation_id} are not contiguous: \
             {} items, first gap at position {gap}",
            report.item_count
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::fixtures::LedgerBuilder;
    use crate::repositories::ContextItemRepo;
    use assert_matches::assert_matches;
    use lcm_core::MessageId;
    use proptest::prelude::*;

    fn ledger_with_messages(n: usize) -> (LedgerBuilder, ConversationId, Vec<MessageId>) {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let ids: Vec<MessageId> = (0..n)
            .map(|i| {
                let id = ledger.message(conv, "user", &format!("m{i}"), 1);
                ledger.push_message(conv, id);
                id
            })
            .collect();
        (ledger, conv, ids)
    }

    fn message_order(ledger: &LedgerBuilder, conv: ConversationId) -> Vec<(i64, MessageId)> {
        ContextItemRepo::list(ledger.conn(), conv)
            .unwrap()
            .into_iter()
            .filter_map(|item| item.message_id.map(|m| (item.ordinal, m)))
            .collect()
    }

    #[test]
    fn shift_opens_gap_after_position() {
        let (ledger, conv, ids) = ledger_with_messages(5);
        let moved = shift_ordinals(ledger.conn(), conv, 3, 2).unwrap();
        assert_eq!(moved, 2);

        let order = message_order(&ledger, conv);
        assert_eq!(
            order,
            [(0, ids[0]), (1, ids[1]), (2, ids[2]), (5, ids[3]), (6, ids[4])]
        );
        assert_eq!(check_contiguity(ledger.conn(), conv).unwrap().first_gap, Some(3));
    }

    #[test]
    fn shift_from_zero_moves_everything() {
        let (ledger, conv, _) = ledger_with_messages(3);
        assert_eq!(shift_ordinals(ledger.conn(), conv, 0, 3).unwrap(), 3);
        let ordinals: Vec<i64> = message_order(&ledger, conv).iter().map(|(o, _)| *o).collect();
        assert_eq!(ordinals, [3, 4, 5]);
    }

    #[test]
    fn zero_shift_and_empty_tail_are_noops() {
        let (ledger, conv, _) = ledger_with_messages(3);
        assert_eq!(shift_ordinals(ledger.conn(), conv, 0, 0).unwrap(), 0);
        assert_eq!(shift_ordinals(ledger.conn(), conv, 3, 4).unwrap(), 0);
        assert!(check_contiguity(ledger.conn(), conv).unwrap().is_contiguous());
    }

    #[test]
    fn shift_leaves_other_conversations_alone() {
        let (ledger, conv, _) = ledger_with_messages(3);
        let other = ledger.conversation("other");
        let m = ledger.message(other, "user", "x", 1);
        ledger.push_message(other, m);

        shift_ordinals(ledger.conn(), conv, 0, 1).unwrap();
        assert_eq!(message_order(&ledger, other), [(0, m)]);
    }

    #[test]
    fn negative_shift_is_rejected() {
        let (ledger, conv, _) = ledger_with_messages(2);
        assert_matches!(
            shift_ordinals(ledger.conn(), conv, 0, -1),
            Err(LedgerError::Integrity(msg)) if msg.contains("negative")
        );
    }

    #[test]
    fn ensure_contiguous_reports_gap() {
        let (ledger, conv, _) = ledger_with_messages(3);
        ledger
            .conn()
            .execute("DELETE FROM context_items WHERE conversation_id = ?1 AND ordinal = 1", params![conv])
            .unwrap();

        let report = check_contiguity(ledger.conn(), conv).unwrap();
        assert_eq!(report.item_count, 2);
        assert_eq!(report.first_gap, Some(1));
        assert_matches!(
            ensure_contiguous(ledger.conn(), conv),
            Err(LedgerError::Integrity(msg)) if msg.contains("first gap at position 1")
        );
    }

    #[test]
    fn empty_conversation_is_contiguous() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let report = ensure_contiguous(ledger.conn(), conv).unwrap();
        assert_eq!(report.item_count, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn shift_then_fill_stays_contiguous(n in 0_usize..24, from_frac in 0.0_f64..=1.0, shift in 0_i64..6) {
            let (ledger, conv, ids) = ledger_with_messages(n);
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
            let from = (from_frac * n as f64).floor() as i64;

            shift_ordinals(ledger.conn(), conv, from, shift).unwrap();
            for slot in from..from + shift {
                let filler = ledger.message(conv, "user", "filler", 1);
                ContextItemRepo::insert_message(ledger.conn(), conv, slot, filler, "2026-01-01 00:00:00").unwrap();
            }

            let report = check_contiguity(ledger.conn(), conv).unwrap();
            prop_assert!(report.is_contiguous());
            prop_assert_eq!(report.item_count, n + usize::try_from(shift).unwrap());

            let originals: Vec<MessageId> = message_order(&ledger, conv)
                .into_iter()
                .map(|(_, m)| m)
                .filter(|m| ids.contains(m))
                .collect();
            prop_assert_eq!(originals, ids);
        }
    }
}
