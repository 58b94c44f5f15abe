//! Transplant: deep-copy the summaries in one conversation's active context,
//! with every ancestor they were condensed from, into another conversation.
//!
//! The copies get fresh IDs and are owned by the target, so no summary edge
//! crosses conversations afterwards. Message edges are copied unchanged;
//! messages are immutable and may be shared. Only the top-level summaries
//! take context slots in the target, prepended at ordinals `0..|T|`.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use lcm_core::{Clock, ConversationId, IdSource, SummaryId, SummaryKind};
use lcm_store::repositories::{ContextItemRepo, ConversationRepo, SummaryRepo};
use lcm_store::row_types::SummaryRow;
use lcm_store::{LedgerError, Result, ensure_contiguous, shift_ordinals};

use crate::traversal::{ancestor_closure, topological_order};

/// Attempts at drawing an unused summary ID before giving up.
pub const MAX_MINT_ATTEMPTS: usize = 32;

/// Source and target of a transplant.
#[derive(Clone, Copy, Debug)]
pub struct TransplantRequest {
    /// Conversation copied from; never modified.
    pub source_conversation_id: ConversationId,
    /// Conversation copied into.
    pub target_conversation_id: ConversationId,
}

/// A summary-type context item of the source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TopLevelItem {
    /// Summary ID in the source.
    pub summary_id: SummaryId,
    /// Ordinal in the source context.
    pub source_ordinal: i64,
    /// Leaf or condensed.
    pub kind: SummaryKind,
    /// Stored depth.
    pub depth: i64,
    /// Token count.
    pub token_count: i64,
}

/// Outcome of a transplant, planned or applied.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TransplantReport {
    /// Conversation copied from.
    pub source_conversation_id: ConversationId,
    /// Conversation copied into.
    pub target_conversation_id: ConversationId,
    /// Source summaries that take context slots in the target, in order.
    pub top_level: Vec<TopLevelItem>,
    /// Summaries copied, top-level items and their ancestors.
    pub closure_size: usize,
    /// Copied summaries per depth.
    pub by_depth: BTreeMap<i64, usize>,
    /// Tokens added to the target's active context.
    pub token_overhead: i64,
    /// Target context items before.
    pub target_items_before: i64,
    /// Target context items after.
    pub target_items_after: i64,
    /// Source ID to copy ID, in copy order. Empty until applied.
    pub id_map: Vec<(SummaryId, SummaryId)>,
    /// Whether the change was committed.
    pub applied: bool,
}

/// Plans and applies transplants against one connection.
pub struct TransplantEngine<'a> {
    conn: &'a Connection,
    clock: &'a dyn Clock,
    ids: &'a dyn IdSource,
}

struct Prepared {
    report: TransplantReport,
    top_ids: Vec<SummaryId>,
    copy_order: Vec<SummaryRow>,
}

impl<'a> TransplantEngine<'a> {
    /// Create an engine stamping with `clock` and minting IDs from `ids`.
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock, ids: &'a dyn IdSource) -> Self {
        Self { conn, clock, ids }
    }

    /// Validate and compute the effect of a transplant without writing.
    #[instrument(skip(self), fields(source = request.source_conversation_id, target = request.target_conversation_id))]
    pub fn plan(&self, request: TransplantRequest) -> Result<TransplantReport> {
        let prepared = prepare(self.conn, request)?;
        debug!(
            top_level = prepared.report.top_level.len(),
            closure = prepared.report.closure_size,
            "transplant planned"
        );
        Ok(prepared.report)
    }

    /// Transplant in one transaction. Nothing is written on error.
    #[instrument(skip(self), fields(source = request.source_conversation_id, target = request.target_conversation_id))]
    pub fn apply(&self, request: TransplantRequest) -> Result<TransplantReport> {
        let tx = self.conn.unchecked_transaction()?;
        let Prepared {
            mut report,
            top_ids,
            copy_order,
        } = prepare(&tx, request)?;
        let target = request.target_conversation_id;

        let mut id_map: HashMap<SummaryId, SummaryId> = HashMap::with_capacity(copy_order.len());
        let mut minted: HashSet<SummaryId> = HashSet::with_capacity(copy_order.len());
        for original in copy_order {
            let new_id = mint(&tx, self.ids, &minted)?;
            let _ = minted.insert(new_id.clone());
            copy_summary(&tx, &original, &new_id, target, &id_map)?;
            report.id_map.push((original.summary_id.clone(), new_id.clone()));
            let _ = id_map.insert(original.summary_id, new_id);
        }

        let slots = i64::try_from(top_ids.len())
            .map_err(|_| LedgerError::Precondition("too many top-level summaries".into()))?;
        let _ = shift_ordinals(&tx, target, 0, slots)?;
        let now = self.clock.now();
        for (ordinal, old_id) in (0_i64..).zip(&top_ids) {
            let new_id = id_map.get(old_id).ok_or_else(|| {
                LedgerError::Integrity(format!("top-level summary {old_id} was not copied"))
            })?;
            ContextItemRepo::insert_summary(&tx, target, ordinal, new_id, &now)?;
        }

        let contiguity = ensure_contiguous(&tx, target)?;
        if i64::try_from(contiguity.item_count).ok() != Some(report.target_items_after) {
            return Err(LedgerError::Integrity(format!(
                "expected {} context items in conversation {target} after transplant, found {}",
                report.target_items_after, contiguity.item_count
            )));
        }

        tx.commit()?;
        report.applied = true;
        info!(
            top_level = report.top_level.len(),
            copied = report.closure_size,
            token_overhead = report.token_overhead,
            target_items_after = report.target_items_after,
            "transplant applied"
        );
        Ok(report)
    }
}

fn prepare(conn: &Connection, request: TransplantRequest) -> Result<Prepared> {
    let TransplantRequest {
        source_conversation_id: source,
        target_conversation_id: target,
    } = request;
    if source == target {
        return Err(LedgerError::Precondition(format!(
            "source and target are the same conversation ({source})"
        )));
    }
    let _ = ConversationRepo::require(conn, source)?;
    let _ = ConversationRepo::require(conn, target)?;

    let items = ContextItemRepo::summary_items(conn, source)?;
    if items.is_empty() {
        return Err(LedgerError::Precondition(format!(
            "conversation {source} has no summaries in its active context; nothing to transplant"
        )));
    }

    let mut top_level = Vec::with_capacity(items.len());
    let mut top_ids = Vec::with_capacity(items.len());
    for item in items {
        let summary_id = item.summary_id.ok_or_else(|| {
            LedgerError::Integrity(format!(
                "summary context item at ordinal {} of conversation {source} has no summary id",
                item.ordinal
            ))
        })?;
        let row = require_summary(conn, &summary_id)?;
        top_level.push(TopLevelItem {
            summary_id: summary_id.clone(),
            source_ordinal: item.ordinal,
            kind: row.kind,
            depth: row.depth,
            token_count: row.token_count,
        });
        top_ids.push(summary_id);
    }

    let closure = ancestor_closure(&top_ids, |id| {
        Ok(SummaryRepo::parent_edges_of(conn, id)?
            .into_iter()
            .map(|edge| edge.parent_summary_id)
            .collect())
    })?;
    let rows = closure
        .iter()
        .map(|id| require_summary(conn, id))
        .collect::<Result<Vec<_>>>()?;
    let copy_order = topological_order(rows);

    check_not_already_transplanted(conn, &top_level, target)?;

    let mut by_depth: BTreeMap<i64, usize> = BTreeMap::new();
    for row in &copy_order {
        *by_depth.entry(row.depth).or_default() += 1;
    }
    let slots = i64::try_from(top_ids.len())
        .map_err(|_| LedgerError::Precondition("too many top-level summaries".into()))?;
    let target_items_before = ContextItemRepo::count(conn, target)?;

    Ok(Prepared {
        report: TransplantReport {
            source_conversation_id: source,
            target_conversation_id: target,
            token_overhead: top_level.iter().map(|t| t.token_count).sum(),
            top_level,
            closure_size: copy_order.len(),
            by_depth,
            target_items_before,
            target_items_after: target_items_before + slots,
            id_map: Vec::new(),
            applied: false,
        },
        top_ids,
        copy_order,
    })
}

fn require_summary(conn: &Connection, summary_id: &SummaryId) -> Result<SummaryRow> {
    SummaryRepo::get(conn, summary_id)?.ok_or_else(|| {
        LedgerError::Integrity(format!("summary {summary_id} is referenced but does not exist"))
    })
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Abort when any top-level summary's content already exists in the target.
fn check_not_already_transplanted(
    conn: &Connection,
    top_level: &[TopLevelItem],
    target: ConversationId,
) -> Result<()> {
    let existing: HashMap<String, SummaryId> = SummaryRepo::list_for_conversation(conn, target)?
        .into_iter()
        .map(|row| (content_hash(&row.content), row.summary_id))
        .collect();
    if existing.is_empty() {
        return Ok(());
    }

    for item in top_level {
        let content = require_summary(conn, &item.summary_id)?.content;
        if let Some(twin) = existing.get(&content_hash(&content)) {
            return Err(LedgerError::Conflict(format!(
                "summary {} already has an identical copy {twin} in conversation {target}; \
                 it looks like a previous transplant",
                item.summary_id
            )));
        }
    }
    Ok(())
}

/// Draw a well-formed ID not used by any summary or minted earlier in this run.
fn mint(conn: &Connection, ids: &dyn IdSource, minted: &HashSet<SummaryId>) -> Result<SummaryId> {
    for attempt in 1..=MAX_MINT_ATTEMPTS {
        let candidate = ids.next_summary_id();
        if !candidate.is_well_formed() {
            warn!(%candidate, attempt, "id source produced a malformed summary id");
            continue;
        }
        if minted.contains(&candidate) || SummaryRepo::exists(conn, &candidate)? {
            debug!(%candidate, attempt, "summary id collision, drawing again");
            continue;
        }
        return Ok(candidate);
    }
    Err(LedgerError::Integrity(format!(
        "could not mint an unused summary id in {MAX_MINT_ATTEMPTS} attempts"
    )))
}

/// Insert the copy of `original` and its edges. Every parent must already
/// have been copied.
fn copy_summary(
    conn: &Connection,
    original: &SummaryRow,
    new_id: &SummaryId,
    target: ConversationId,
    id_map: &HashMap<SummaryId, SummaryId>,
) -> Result<()> {
    SummaryRepo::insert(
        conn,
        &SummaryRow {
            summary_id: new_id.clone(),
            conversation_id: target,
            ..original.clone()
        },
    )?;

    for edge in SummaryRepo::message_edges_of(conn, &original.summary_id)? {
        SummaryRepo::insert_message_edge(conn, new_id, edge.message_id, edge.ordinal)?;
    }

    for edge in SummaryRepo::parent_edges_of(conn, &original.summary_id)? {
        let parent = id_map.get(&edge.parent_summary_id).ok_or_else(|| {
            LedgerError::Integrity(format!(
                "parent {} of {} has no copy yet; depth ordering is inconsistent",
                edge.parent_summary_id, original.summary_id
            ))
        })?;
        SummaryRepo::insert_parent_edge(conn, new_id, parent, edge.ordinal)?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
