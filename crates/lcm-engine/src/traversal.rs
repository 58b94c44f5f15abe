//! Traversal primitives over the parent relation.

use std::collections::{HashSet, VecDeque};

use lcm_core::SummaryId;
use lcm_store::Result;
use lcm_store::row_types::SummaryRow;

/// Every summary reachable from `start` by following parent edges,
/// `start` included, each exactly once, in breadth-first discovery order.
///
/// `parents_of` is asked once per discovered summary. A visited set bounds
/// the walk, so a cyclic parent relation still terminates.
pub fn ancestor_closure<F>(start: &[SummaryId], mut parents_of: F) -> Result<Vec<SummaryId>>
where
    F: FnMut(&SummaryId) -> Result<Vec<SummaryId>>,
{
    let mut seen: HashSet<SummaryId> = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<SummaryId> = VecDeque::new();

    for id in start {
        if seen.insert(id.clone()) {
            queue.push_back(id.clone());
        }
    }

    while let Some(id) = queue.pop_front() {
        for parent in parents_of(&id)? {
            if seen.insert(parent.clone()) {
                queue.push_back(parent);
            }
        }
        order.push(id);
    }

    Ok(order)
}

/// Sort summaries parents-first: ascending depth, then creation time, then ID.
///
/// Relies on the depth convention (a condensed summary is deeper than each
/// of its parents); callers that need the guarantee must check it while
/// consuming the order.
pub fn topological_order(mut summaries: Vec<SummaryRow>) -> Vec<SummaryRow> {
    summaries.sort_by(|a, b| {
        a.depth
            .cmp(&b.depth)
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.summary_id.cmp(&b.summary_id))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use lcm_core::SummaryKind;

    fn id(s: &str) -> SummaryId {
        SummaryId::from(s)
    }

    fn parents(edges: &[(&str, &str)]) -> impl FnMut(&SummaryId) -> Result<Vec<SummaryId>> {
        let mut map: HashMap<SummaryId, Vec<SummaryId>> = HashMap::new();
        for (child, parent) in edges {
            map.entry(id(child)).or_default().push(id(parent));
        }
        move |s| Ok(map.get(s).cloned().unwrap_or_default())
    }

    fn row(summary_id: &str, depth: i64, created_at: &str) -> SummaryRow {
        SummaryRow {
            summary_id: id(summary_id),
            conversation_id: 1,
            kind: if depth == 0 { SummaryKind::Leaf } else { SummaryKind::Condensed },
            depth,
            content: String::new(),
            token_count: 0,
            file_ids: Vec::new(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn closure_deduplicates_shared_ancestors() {
        // top1 -> {a, b}, top2 -> {b}, b -> {c}
        let closure = ancestor_closure(
            &[id("top1"), id("top2")],
            parents(&[("top1", "a"), ("top1", "b"), ("top2", "b"), ("b", "c")]),
        )
        .unwrap();
        assert_eq!(closure, [id("top1"), id("top2"), id("a"), id("b"), id("c")]);
    }

    #[test]
    fn closure_includes_duplicate_start_once() {
        let closure = ancestor_closure(&[id("x"), id("x")], parents(&[])).unwrap();
        assert_eq!(closure, [id("x")]);
    }

    #[test]
    fn closure_terminates_on_cycle() {
        let closure = ancestor_closure(
            &[id("a")],
            parents(&[("a", "b"), ("b", "c"), ("c", "a")]),
        )
        .unwrap();
        assert_eq!(closure.len(), 3);
    }

    #[test]
    fn closure_propagates_lookup_errors() {
        let result = ancestor_closure(&[id("a")], |_| {
            Err(lcm_store::LedgerError::Integrity("boom".into()))
        });
        assert!(result.is_err());
    }

    #[test]
    fn order_is_depth_then_time_then_id() {
        let ordered = topological_order(vec![
            row("d2", 2, "2026-01-01 00:00:01"),
            row("b", 0, "2026-01-01 00:00:05"),
            row("c1", 1, "2026-01-01 00:00:00"),
            row("a2", 0, "2026-01-01 00:00:05"),
            row("a1", 0, "2026-01-01 00:00:02"),
        ]);
        let ids: Vec<&str> = ordered.iter().map(|r| r.summary_id.as_str()).collect();
        assert_eq!(ids, ["a1", "a2", "b", "c1", "d2"]);
    }
}
