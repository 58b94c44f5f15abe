//! Dissolve: replace one condensed summary in the active context with the
//! summaries it was condensed from.
//!
//! The summary row and its edges stay in the DAG unless purge is requested.
//! Purge is refused while anything else still refers to the summary.

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info, instrument};

use lcm_core::{Clock, ConversationId, SummaryId, SummaryKind};
use lcm_store::repositories::{ContextItemRepo, ConversationRepo, SummaryRepo};
use lcm_store::{LedgerError, Result, ensure_contiguous, shift_ordinals};

/// What to dissolve.
#[derive(Clone, Debug)]
pub struct DissolveRequest {
    /// Conversation whose context is rewritten.
    pub conversation_id: ConversationId,
    /// Condensed summary to dissolve.
    pub summary_id: SummaryId,
    /// Also delete the summary row and its edges.
    pub purge: bool,
}

/// The summary being dissolved.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DissolveTarget {
    /// Summary ID.
    pub summary_id: SummaryId,
    /// Always condensed for a valid plan.
    pub kind: SummaryKind,
    /// Stored depth.
    pub depth: i64,
    /// Token count.
    pub token_count: i64,
    /// Its position in the active context.
    pub ordinal: i64,
}

/// A parent that will take the target's place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DissolveParent {
    /// Parent summary ID.
    pub summary_id: SummaryId,
    /// Edge ordinal; parents are reinserted in this order.
    pub edge_ordinal: i64,
    /// Leaf or condensed.
    pub kind: SummaryKind,
    /// Stored depth.
    pub depth: i64,
    /// Token count.
    pub token_count: i64,
    /// Summary text.
    pub content: String,
}

/// Outcome of a dissolve, planned or applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DissolveReport {
    /// Conversation whose context is rewritten.
    pub conversation_id: ConversationId,
    /// The summary being dissolved.
    pub target: DissolveTarget,
    /// Its parents in edge order.
    pub parents: Vec<DissolveParent>,
    /// Context items before.
    pub items_before: i64,
    /// Context items after.
    pub items_after: i64,
    /// Items after the target that move.
    pub items_shifted: i64,
    /// How far they move.
    pub shift: i64,
    /// First ordinal holding a parent afterwards.
    pub first_ordinal: i64,
    /// Last ordinal holding a parent afterwards.
    pub last_ordinal: i64,
    /// Parents' tokens minus the target's tokens.
    pub token_delta: i64,
    /// Whether the summary row is deleted.
    pub purge: bool,
    /// Whether the change was committed.
    pub applied: bool,
}

impl DissolveReport {
    /// Total tokens of the parents.
    pub fn parent_tokens(&self) -> i64 {
        self.parents.iter().map(|p| p.token_count).sum()
    }
}

/// Plans and applies dissolves against one connection.
pub struct DissolveEngine<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
}

impl<'a> DissolveEngine<'a> {
    /// Create an engine that stamps new context items with `clock`.
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock) -> Self {
        Self { conn, clock }
    }

    /// Validate and compute the effect of a dissolve without writing.
    #[instrument(skip(self, request), fields(conversation_id = request.conversation_id, summary_id = %request.summary_id))]
    pub fn plan(&self, request: &DissolveRequest) -> Result<DissolveReport> {
        let report = validate(self.conn, request)?;
        debug!(
            parents = report.parents.len(),
            shift = report.shift,
            "dissolve planned"
        );
        Ok(report)
    }

    /// Dissolve in one transaction. Nothing is written on error.
    #[instrument(skip(self, request), fields(conversation_id = request.conversation_id, summary_id = %request.summary_id))]
    pub fn apply(&self, request: &DissolveRequest) -> Result<DissolveReport> {
        let tx = self.conn.unchecked_transaction()?;
        let mut report = validate(&tx, request)?;
        let conversation_id = request.conversation_id;
        let target = &report.target;

        let deleted =
            ContextItemRepo::delete_summary_at(&tx, conversation_id, target.ordinal, &target.summary_id)?;
        if deleted != 1 {
            return Err(LedgerError::Integrity(format!(
                "expected to delete 1 context item for {} at ordinal {}, deleted {deleted}",
                target.summary_id, target.ordinal
            )));
        }

        if report.shift > 0 {
            let moved = shift_ordinals(&tx, conversation_id, target.ordinal + 1, report.shift)?;
            if i64::try_from(moved).ok() != Some(report.items_shifted) {
                return Err(LedgerError::Integrity(format!(
                    "expected to shift {} context items, shifted {moved}",
                    report.items_shifted
                )));
            }
        }

        let now = self.clock.now();
        for (ordinal, parent) in (target.ordinal..).zip(&report.parents) {
            ContextItemRepo::insert_summary(&tx, conversation_id, ordinal, &parent.summary_id, &now)?;
        }

        if request.purge {
            purge(&tx, &target.summary_id)?;
        }

        let contiguity = ensure_contiguous(&tx, conversation_id)?;
        if i64::try_from(contiguity.item_count).ok() != Some(report.items_after) {
            return Err(LedgerError::Integrity(format!(
                "expected {} context items after dissolve, found {}",
                report.items_after, contiguity.item_count
            )));
        }

        tx.commit()?;
        report.applied = true;
        info!(
            parents = report.parents.len(),
            items_before = report.items_before,
            items_after = report.items_after,
            first_ordinal = report.first_ordinal,
            last_ordinal = report.last_ordinal,
            purged = report.purge,
            "dissolve applied"
        );
        Ok(report)
    }
}

fn validate(conn: &Connection, request: &DissolveRequest) -> Result<DissolveReport> {
    let conversation_id = request.conversation_id;
    let summary_id = &request.summary_id;
    let not_in_context = || LedgerError::NotInActiveContext {
        summary_id: summary_id.clone(),
        conversation_id,
    };

    let _ = ConversationRepo::require(conn, conversation_id)?;

    let summary = SummaryRepo::get(conn, summary_id)?
        .filter(|s| s.conversation_id == conversation_id)
        .ok_or_else(not_in_context)?;

    let ordinals = ContextItemRepo::ordinals_of_summary(conn, conversation_id, summary_id)?;
    let ordinal = match ordinals.as_slice() {
        [] => return Err(not_in_context()),
        [ordinal] => *ordinal,
        many => {
            return Err(LedgerError::Precondition(format!(
                "summary {summary_id} occupies {} context ordinals in conversation {conversation_id}; expected exactly one",
                many.len()
            )));
        }
    };

    if summary.kind != SummaryKind::Condensed {
        return Err(LedgerError::NotCondensable {
            summary_id: summary_id.clone(),
            kind: summary.kind,
            depth: summary.depth,
        });
    }

    let edges = SummaryRepo::parent_edges_of(conn, summary_id)?;
    if edges.is_empty() {
        return Err(LedgerError::NothingToDissolve(summary_id.clone()));
    }
    let links = SummaryRepo::parents_of(conn, summary_id)?;
    if links.len() != edges.len() {
        return Err(LedgerError::Integrity(format!(
            "summary {summary_id} has {} parent edges but only {} parent rows exist",
            edges.len(),
            links.len()
        )));
    }

    if request.purge {
        check_purgeable(conn, summary_id)?;
    }

    let parents: Vec<DissolveParent> = links
        .into_iter()
        .map(|link| DissolveParent {
            summary_id: link.summary.summary_id,
            edge_ordinal: link.ordinal,
            kind: link.summary.kind,
            depth: link.summary.depth,
            token_count: link.summary.token_count,
            content: link.summary.content,
        })
        .collect();

    let k = i64::try_from(parents.len())
        .map_err(|_| LedgerError::Precondition(format!("summary {summary_id} has too many parents")))?;
    let items_before = ContextItemRepo::count(conn, conversation_id)?;
    let items_shifted = ContextItemRepo::count_after(conn, conversation_id, ordinal)?;
    let parent_tokens: i64 = parents.iter().map(|p| p.token_count).sum();

    Ok(DissolveReport {
        conversation_id,
        target: DissolveTarget {
            summary_id: summary.summary_id,
            kind: summary.kind,
            depth: summary.depth,
            token_count: summary.token_count,
            ordinal,
        },
        items_before,
        items_after: items_before + k - 1,
        items_shifted,
        shift: k - 1,
        first_ordinal: ordinal,
        last_ordinal: ordinal + k - 1,
        token_delta: parent_tokens - summary.token_count,
        parents,
        purge: request.purge,
        applied: false,
    })
}

/// Refuse to purge a summary that another summary or context item still uses.
fn check_purgeable(conn: &Connection, summary_id: &SummaryId) -> Result<()> {
    let children = SummaryRepo::children_of(conn, summary_id)?;
    if !children.is_empty() {
        let listed: Vec<&str> = children.iter().map(SummaryId::as_str).collect();
        return Err(LedgerError::Precondition(format!(
            "cannot purge {summary_id}: still a parent of {}",
            listed.join(", ")
        )));
    }
    let references = ContextItemRepo::count_summary_references(conn, summary_id)?;
    if references > 1 {
        return Err(LedgerError::Precondition(format!(
            "cannot purge {summary_id}: referenced by {} other context items",
            references - 1
        )));
    }
    Ok(())
}

fn purge(conn: &Connection, summary_id: &SummaryId) -> Result<()> {
    let message_edges = SummaryRepo::delete_message_edges(conn, summary_id)?;
    let parent_edges = SummaryRepo::delete_parent_edges(conn, summary_id)?;
    let rows = SummaryRepo::delete(conn, summary_id)?;
    if rows != 1 {
        return Err(LedgerError::Integrity(format!(
            "expected to delete summary {summary_id}, deleted {rows} rows"
        )));
    }
    debug!(%summary_id, message_edges, parent_edges, "purged summary");
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use lcm_core::FixedClock;
    use lcm_store::ErrorCategory;
    use lcm_store::fixtures::LedgerBuilder;

    const NOW: &str = "2026-03-01 12:00:00";

    struct Setup {
        ledger: LedgerBuilder,
        conv: ConversationId,
        parents: Vec<SummaryId>,
        top: SummaryId,
    }

    /// Context: [m0, top, m1] where top is condensed from three leaves.
    fn setup() -> Setup {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let m0 = ledger.message(conv, "user", "m0", 5);
        let m1 = ledger.message(conv, "user", "m1", 5);
        let parents: Vec<SummaryId> = (0..3)
            .map(|i| ledger.leaf(conv, &format!("leaf {i}"), 100, &[m0]))
            .collect();
        let refs: Vec<&SummaryId> = parents.iter().collect();
        let top = ledger.condensed(conv, "top", 120, &refs);
        ledger.push_message(conv, m0);
        ledger.push_summary(conv, &top);
        ledger.push_message(conv, m1);
        Setup {
            ledger,
            conv,
            parents,
            top,
        }
    }

    fn request(conv: ConversationId, summary_id: &SummaryId, purge: bool) -> DissolveRequest {
        DissolveRequest {
            conversation_id: conv,
            summary_id: summary_id.clone(),
            purge,
        }
    }

    #[test]
    fn plan_reports_effects_without_writing() {
        let s = setup();
        let clock = FixedClock(NOW.into());
        let before = s.ledger.snapshot(s.conv);

        let report = DissolveEngine::new(s.ledger.conn(), &clock)
            .plan(&request(s.conv, &s.top, false))
            .unwrap();

        assert!(!report.applied);
        assert_eq!(report.target.ordinal, 1);
        assert_eq!(report.items_before, 3);
        assert_eq!(report.items_after, 5);
        assert_eq!(report.items_shifted, 1);
        assert_eq!(report.shift, 2);
        assert_eq!((report.first_ordinal, report.last_ordinal), (1, 3));
        assert_eq!(report.token_delta, 300 - 120);
        assert_eq!(report.parent_tokens(), 300);
        let planned: Vec<SummaryId> = report.parents.iter().map(|p| p.summary_id.clone()).collect();
        assert_eq!(planned, s.parents);
        assert_eq!(s.ledger.snapshot(s.conv), before);
    }

    #[test]
    fn apply_replaces_target_with_parents_in_edge_order() {
        let s = setup();
        let clock = FixedClock(NOW.into());

        let report = DissolveEngine::new(s.ledger.conn(), &clock)
            .apply(&request(s.conv, &s.top, false))
            .unwrap();
        assert!(report.applied);

        let items = ContextItemRepo::list(s.ledger.conn(), s.conv).unwrap();
        let ordinals: Vec<i64> = items.iter().map(|i| i.ordinal).collect();
        assert_eq!(ordinals, [0, 1, 2, 3, 4]);
        let inserted: Vec<SummaryId> = items[1..4]
            .iter()
            .map(|i| i.summary_id.clone().unwrap())
            .collect();
        assert_eq!(inserted, s.parents);
        assert!(items[1..4].iter().all(|i| i.created_at == NOW));
        assert!(items[4].message_id.is_some());

        // Without purge the summary and its edges remain.
        assert!(SummaryRepo::exists(s.ledger.conn(), &s.top).unwrap());
        assert_eq!(SummaryRepo::parent_edges_of(s.ledger.conn(), &s.top).unwrap().len(), 3);
    }

    #[test]
    fn single_parent_needs_no_shift() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let leaf = ledger.leaf(conv, "leaf", 10, &[]);
        let top = ledger.condensed(conv, "top", 5, &[&leaf]);
        let tail = ledger.leaf(conv, "tail", 10, &[]);
        ledger.push_summary(conv, &top);
        ledger.push_summary(conv, &tail);
        let clock = FixedClock(NOW.into());

        let report = DissolveEngine::new(ledger.conn(), &clock)
            .apply(&request(conv, &top, false))
            .unwrap();
        assert_eq!(report.shift, 0);
        assert_eq!(report.items_after, 2);

        let items = ContextItemRepo::list(ledger.conn(), conv).unwrap();
        assert_eq!(items[0].summary_id.as_ref(), Some(&leaf));
        assert_eq!(items[1].summary_id.as_ref(), Some(&tail));
    }

    #[test]
    fn leaf_is_not_condensable() {
        let s = setup();
        s.ledger.push_summary(s.conv, &s.parents[0]);
        let before = s.ledger.snapshot(s.conv);
        let clock = FixedClock(NOW.into());

        let err = DissolveEngine::new(s.ledger.conn(), &clock)
            .apply(&request(s.conv, &s.parents[0], false))
            .unwrap_err();
        assert_matches!(err, LedgerError::NotCondensable { kind: SummaryKind::Leaf, .. });
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert_eq!(s.ledger.snapshot(s.conv), before);
    }

    #[test]
    fn condensed_without_parents_has_nothing_to_dissolve() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let orphan = ledger.condensed_at_depth(conv, "orphan", 10, 1, &[]);
        ledger.push_summary(conv, &orphan);
        let clock = FixedClock(NOW.into());

        assert_matches!(
            DissolveEngine::new(ledger.conn(), &clock).plan(&request(conv, &orphan, false)),
            Err(LedgerError::NothingToDissolve(id)) if id == orphan
        );
    }

    #[test]
    fn applying_without_parents_changes_nothing() {
        let ledger = LedgerBuilder::new();
        let conv = ledger.conversation("sess");
        let m0 = ledger.message(conv, "user", "m0", 5);
        ledger.push_message(conv, m0);
        let orphan = ledger.condensed_at_depth(conv, "orphan", 10, 1, &[]);
        ledger.push_summary(conv, &orphan);
        let before = ledger.snapshot(conv);
        let clock = FixedClock(NOW.into());

        let err = DissolveEngine::new(ledger.conn(), &clock)
            .apply(&request(conv, &orphan, true))
            .unwrap_err();
        assert_matches!(err, LedgerError::NothingToDissolve(_));
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert_eq!(ledger.snapshot(conv), before);
    }

    #[test]
    fn summary_outside_context_is_rejected() {
        let s = setup();
        let clock = FixedClock(NOW.into());
        let engine = DissolveEngine::new(s.ledger.conn(), &clock);

        // Exists but is not in the active context.
        let sibling = s.ledger.condensed(s.conv, "sibling", 1, &[&s.parents[0]]);
        assert_matches!(
            engine.plan(&request(s.conv, &sibling, false)),
            Err(LedgerError::NotInActiveContext { .. })
        );
        // Does not exist.
        assert_matches!(
            engine.plan(&request(s.conv, &SummaryId::from("sum_ffffffffffffffff"), false)),
            Err(LedgerError::NotInActiveContext { .. })
        );
        // Owned by another conversation.
        let other = s.ledger.conversation("other");
        assert_matches!(
            engine.plan(&request(other, &s.top, false)),
            Err(LedgerError::NotInActiveContext { .. })
        );
        assert_matches!(
            engine.plan(&request(999, &s.top, false)),
            Err(LedgerError::ConversationNotFound(999))
        );
    }

    #[test]
    fn applying_outside_context_changes_nothing() {
        let s = setup();
        let sibling = s.ledger.condensed(s.conv, "sibling", 1, &[&s.parents[0]]);
        let other = s.ledger.conversation("other");
        let before = s.ledger.snapshot(s.conv);
        let other_before = s.ledger.snapshot(other);
        let clock = FixedClock(NOW.into());
        let engine = DissolveEngine::new(s.ledger.conn(), &clock);

        for (conv, target) in [
            (s.conv, sibling.clone()),
            (s.conv, SummaryId::from("sum_ffffffffffffffff")),
            (other, s.top.clone()),
        ] {
            let err = engine.apply(&request(conv, &target, true)).unwrap_err();
            assert_matches!(err, LedgerError::NotInActiveContext { .. });
            assert_eq!(err.category(), ErrorCategory::Precondition);
        }
        assert_eq!(s.ledger.snapshot(s.conv), before);
        assert_eq!(s.ledger.snapshot(other), other_before);
        assert!(s.ledger.snapshot(s.conv).summaries.iter().any(|row| row.summary_id == sibling));
    }

    #[test]
    fn target_at_two_ordinals_is_a_precondition_failure() {
        let s = setup();
        s.ledger.push_summary(s.conv, &s.top);
        let clock = FixedClock(NOW.into());

        assert_matches!(
            DissolveEngine::new(s.ledger.conn(), &clock).apply(&request(s.conv, &s.top, false)),
            Err(LedgerError::Precondition(msg)) if msg.contains("occupies 2 context ordinals")
        );
    }

    #[test]
    fn missing_parent_row_is_an_integrity_error() {
        let s = setup();
        s.ledger
            .conn()
            .execute_batch("PRAGMA foreign_keys = OFF;")
            .unwrap();
        s.ledger
            .conn()
            .execute(
                "DELETE FROM summaries WHERE summary_id = ?1",
                [s.parents[1].as_str()],
            )
            .unwrap();
        let before = s.ledger.snapshot(s.conv);
        let clock = FixedClock(NOW.into());

        assert_matches!(
            DissolveEngine::new(s.ledger.conn(), &clock).apply(&request(s.conv, &s.top, false)),
            Err(LedgerError::Integrity(_))
        );
        assert_eq!(s.ledger.snapshot(s.conv), before);
    }

    #[test]
    fn purge_removes_summary_and_edges() {
        let s = setup();
        let clock = FixedClock(NOW.into());

        let report = DissolveEngine::new(s.ledger.conn(), &clock)
            .apply(&request(s.conv, &s.top, true))
            .unwrap();
        assert!(report.purge);
        assert!(!SummaryRepo::exists(s.ledger.conn(), &s.top).unwrap());
        assert!(SummaryRepo::parent_edges_of(s.ledger.conn(), &s.top).unwrap().is_empty());
        for parent in &s.parents {
            assert!(SummaryRepo::exists(s.ledger.conn(), parent).unwrap());
        }
    }

    #[test]
    fn purge_refused_while_another_summary_uses_target() {
        let s = setup();
        let grand = s.ledger.condensed(s.conv, "grand", 50, &[&s.top]);
        let before = s.ledger.snapshot(s.conv);
        let clock = FixedClock(NOW.into());

        let err = DissolveEngine::new(s.ledger.conn(), &clock)
            .apply(&request(s.conv, &s.top, true))
            .unwrap_err();
        assert_matches!(&err, LedgerError::Precondition(msg) if msg.contains(grand.as_str()));
        assert_eq!(s.ledger.snapshot(s.conv), before);

        // Without purge the same dissolve succeeds.
        DissolveEngine::new(s.ledger.conn(), &clock)
            .apply(&request(s.conv, &s.top, false))
            .unwrap();
    }

    #[test]
    fn purge_refused_while_another_context_references_target() {
        let s = setup();
        let other = s.ledger.conversation("other");
        s.ledger.push_summary(other, &s.top);
        let clock = FixedClock(NOW.into());

        assert_matches!(
            DissolveEngine::new(s.ledger.conn(), &clock).plan(&request(s.conv, &s.top, true)),
            Err(LedgerError::Precondition(msg)) if msg.contains("referenced by 1 other context items")
        );
    }
}
