//! Plain-text reports for each command.

use std::io::{self, Write};

use lcm_engine::{DissolveReport, Expansion, SummaryGraph, TransplantReport};
use lcm_store::ContiguityReport;
use lcm_store::row_types::{ContextEntry, ContextTotals, ConversationOverview, MessageRow};

const PREVIEW_CHARS: usize = 80;

/// Collapse all whitespace runs, newlines included, into single spaces.
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` characters, marking the cut with `...`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

fn preview(text: &str) -> String {
    truncate(&one_line(text), PREVIEW_CHARS)
}

fn footer(out: &mut dyn Write, applied: bool, done: &str) -> io::Result<()> {
    if applied {
        writeln!(out, "\n{done}")
    } else {
        writeln!(out, "\nDry run. Use --apply to execute.")
    }
}

pub fn dissolve(out: &mut dyn Write, report: &DissolveReport) -> io::Result<()> {
    let target = &report.target;
    writeln!(
        out,
        "Dissolve {} in conversation {}",
        target.summary_id, report.conversation_id
    )?;
    writeln!(
        out,
        "Target: {} ({}, d{}, {}t) at ordinal {}",
        target.summary_id, target.kind, target.depth, target.token_count, target.ordinal
    )?;
    writeln!(out, "\nParents ({}):", report.parents.len())?;
    for parent in &report.parents {
        writeln!(
            out,
            "  [{}] {} ({}, d{}, {}t) {}",
            parent.edge_ordinal,
            parent.summary_id,
            parent.kind,
            parent.depth,
            parent.token_count,
            preview(&parent.content)
        )?;
    }
    writeln!(
        out,
        "\nToken impact: {}t condensed -> {}t restored ({:+}t)",
        target.token_count,
        report.parent_tokens(),
        report.token_delta
    )?;
    writeln!(
        out,
        "Ordinal shift: {} items after ordinal {} shift by +{}",
        report.items_shifted, target.ordinal, report.shift
    )?;
    writeln!(
        out,
        "Parents occupy ordinals {}-{}; context {} -> {} items",
        report.first_ordinal, report.last_ordinal, report.items_before, report.items_after
    )?;
    if report.purge {
        writeln!(out, "Purge: summary record {} and its edges are deleted", target.summary_id)?;
    }
    footer(
        out,
        report.applied,
        &format!(
            "Done. Context now has {} items. Changes take effect on the next turn.",
            report.items_after
        ),
    )
}

pub fn transplant(out: &mut dyn Write, report: &TransplantReport) -> io::Result<()> {
    writeln!(
        out,
        "Transplant conversation {} -> {}",
        report.source_conversation_id, report.target_conversation_id
    )?;
    writeln!(out, "\nTop-level summaries ({}):", report.top_level.len())?;
    for item in &report.top_level {
        writeln!(
            out,
            "  [{}] {} ({}, d{}, {}t)",
            item.source_ordinal, item.summary_id, item.kind, item.depth, item.token_count
        )?;
    }
    let breakdown: Vec<String> = report
        .by_depth
        .iter()
        .map(|(depth, count)| format!("d{depth}: {count}"))
        .collect();
    writeln!(
        out,
        "\nAncestor closure: {} summaries ({})",
        report.closure_size,
        breakdown.join(", ")
    )?;
    writeln!(out, "Token overhead: +{}t", report.token_overhead)?;
    writeln!(
        out,
        "Target context: {} -> {} items",
        report.target_items_before, report.target_items_after
    )?;
    if report.applied {
        writeln!(out, "\nCopies:")?;
        for (old, new) in &report.id_map {
            writeln!(out, "  {old} -> {new}")?;
        }
    }
    footer(
        out,
        report.applied,
        &format!(
            "Done. Copied {} summaries into conversation {}.",
            report.closure_size, report.target_conversation_id
        ),
    )
}

pub fn graph(out: &mut dyn Write, graph: &SummaryGraph, expansion: &Expansion) -> io::Result<()> {
    writeln!(
        out,
        "Conversation {}: {} summaries, {} roots",
        graph.conversation_id(),
        graph.len(),
        graph.roots().len()
    )?;
    if graph.roots_fallback() {
        writeln!(out, "warning: no roots found; showing every summary as a root")?;
    }
    for row in graph.rows(expansion) {
        let Some(node) = graph.node(&row.summary_id) else {
            continue;
        };
        let marker = if node.children.is_empty() {
            " "
        } else if expansion.is_expanded(&row.summary_id) {
            "-"
        } else {
            "+"
        };
        writeln!(
            out,
            "{}{marker} {} ({}, d{}, {}t) {}",
            "  ".repeat(row.level),
            node.summary_id,
            node.kind,
            node.depth,
            node.token_count,
            preview(&node.content)
        )?;
    }
    Ok(())
}

pub fn context(out: &mut dyn Write, entries: &[ContextEntry]) -> io::Result<()> {
    for entry in entries {
        let item = &entry.item;
        let reference = match (&item.summary_id, item.message_id) {
            (Some(summary_id), _) => summary_id.to_string(),
            (None, Some(message_id)) => format!("#{message_id}"),
            (None, None) => "?".to_string(),
        };
        writeln!(
            out,
            "[{:>4}] {:<7} {reference} {}t",
            item.ordinal, item.item_type, entry.token_count
        )?;
    }
    let totals = ContextTotals::of(entries);
    writeln!(
        out,
        "\n{} items: {} summaries, {} messages, {}t",
        entries.len(),
        totals.summaries,
        totals.messages,
        totals.tokens
    )
}

pub fn sources(out: &mut dyn Write, messages: &[MessageRow]) -> io::Result<()> {
    if messages.is_empty() {
        return writeln!(out, "No source messages.");
    }
    for message in messages {
        writeln!(
            out,
            "#{} {} {}: {}",
            message.message_id,
            message.created_at,
            message.role,
            preview(&message.content)
        )?;
    }
    Ok(())
}

pub fn check(out: &mut dyn Write, conversation_id: i64, report: &ContiguityReport) -> io::Result<()> {
    match report.first_gap {
        None => writeln!(
            out,
            "Conversation {conversation_id}: {} context items, ordinals contiguous",
            report.item_count
        ),
        Some(gap) => writeln!(
            out,
            "Conversation {conversation_id}: {} context items, first gap at position {gap}",
            report.item_count
        ),
    }
}

pub fn conversations(out: &mut dyn Write, overview: &[ConversationOverview]) -> io::Result<()> {
    writeln!(out, "{:>6}  {:<36}  {:>9}  {:>7}  updated", "id", "session", "summaries", "context")?;
    for row in overview {
        writeln!(
            out,
            "{:>6}  {:<36}  {:>9}  {:>7}  {}",
            row.conversation.conversation_id,
            truncate(&row.conversation.session_id, 36),
            row.summary_count,
            row.context_item_count,
            row.conversation.updated_at
        )?;
    }
    Ok(())
}
