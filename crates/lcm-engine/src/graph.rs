//! Summary DAG reconstruction for inspection.
//!
//! Edges are oriented from the summary that was condensed to the summary it
//! was condensed into: a node's `children` are the condensed summaries built
//! from it, and roots are the nodes that never appear as a child. Roots and
//! child lists are sorted by creation time, then ID.

use std::collections::{BTreeMap, HashMap, HashSet};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use lcm_core::{ConversationId, SummaryId, SummaryKind};
use lcm_store::repositories::{ConversationRepo, SummaryRepo};
use lcm_store::row_types::{ParentEdgeRow, SummaryRow};
use lcm_store::{LedgerError, Result};

/// One summary in the reconstructed graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SummaryNode {
    /// Summary ID.
    pub summary_id: SummaryId,
    /// Leaf or condensed.
    pub kind: SummaryKind,
    /// Summary text.
    pub content: String,
    /// Stored depth.
    pub depth: i64,
    /// Token count.
    pub token_count: i64,
    /// Creation timestamp.
    pub created_at: String,
    /// Summaries condensed from this one.
    pub children: Vec<SummaryId>,
}

/// The summary DAG of one conversation.
#[derive(Clone, Debug, Serialize)]
pub struct SummaryGraph {
    conversation_id: ConversationId,
    nodes: BTreeMap<SummaryId, SummaryNode>,
    roots: Vec<SummaryId>,
    roots_fallback: bool,
}

/// Which nodes the display flattening descends into.
#[derive(Clone, Debug, Default)]
pub enum Expansion {
    /// Every node.
    #[default]
    All,
    /// Only the listed nodes; everything else is shown collapsed.
    Only(HashSet<SummaryId>),
}

impl Expansion {
    /// Nothing expanded: only roots are shown.
    pub fn collapsed() -> Self {
        Self::Only(HashSet::new())
    }

    /// Whether the children of `id` are shown.
    pub fn is_expanded(&self, id: &SummaryId) -> bool {
        match self {
            Self::All => true,
            Self::Only(set) => set.contains(id),
        }
    }
}

/// One line of the flattened display.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GraphRow {
    /// The node shown on this line.
    pub summary_id: SummaryId,
    /// Nesting level, 0 for roots.
    pub level: usize,
}

impl SummaryGraph {
    /// Load the graph of a conversation.
    #[instrument(skip(conn))]
    pub fn load(conn: &Connection, conversation_id: ConversationId) -> Result<Self> {
        let _ = ConversationRepo::require(conn, conversation_id)?;
        let rows = SummaryRepo::list_for_conversation(conn, conversation_id)?;
        let edges = SummaryRepo::parent_edges_for_conversation(conn, conversation_id)?;
        Ok(Self::from_parts(conversation_id, rows, edges))
    }

    /// Load the graph of the most recently updated conversation of a session.
    #[instrument(skip(conn))]
    pub fn load_for_session(conn: &Connection, session_id: &str) -> Result<Self> {
        let conversation = ConversationRepo::latest_for_session(conn, session_id)?
            .ok_or_else(|| LedgerError::SessionNotFound(session_id.to_string()))?;
        Self::load(conn, conversation.conversation_id)
    }

    /// Build the graph from already loaded rows.
    ///
    /// Edges with an endpoint outside `rows` are ignored. When every node is
    /// some other node's child (a fully cyclic graph), every node is treated
    /// as a root so the structure stays inspectable.
    pub fn from_parts(
        conversation_id: ConversationId,
        rows: Vec<SummaryRow>,
        edges: Vec<ParentEdgeRow>,
    ) -> Self {
        let mut nodes: BTreeMap<SummaryId, SummaryNode> = rows
            .into_iter()
            .map(|row| {
                let node = SummaryNode {
                    summary_id: row.summary_id.clone(),
                    kind: row.kind,
                    content: row.content,
                    depth: row.depth,
                    token_count: row.token_count,
                    created_at: row.created_at,
                    children: Vec::new(),
                };
                (row.summary_id, node)
            })
            .collect();

        let mut has_parent: HashSet<SummaryId> = HashSet::new();
        let mut dangling = 0_usize;
        for edge in edges {
            if !nodes.contains_key(&edge.summary_id) {
                dangling += 1;
                continue;
            }
            let Some(parent) = nodes.get_mut(&edge.parent_summary_id) else {
                dangling += 1;
                continue;
            };
            parent.children.push(edge.summary_id.clone());
            let _ = has_parent.insert(edge.summary_id);
        }
        if dangling > 0 {
            warn!(conversation_id, dangling, "ignored parent edges leaving the conversation");
        }

        let mut roots: Vec<SummaryId> = nodes
            .keys()
            .filter(|id| !has_parent.contains(*id))
            .cloned()
            .collect();
        let roots_fallback = roots.is_empty() && !nodes.is_empty();
        if roots_fallback {
            warn!(
                conversation_id,
                nodes = nodes.len(),
                "no roots found, treating every summary as a root"
            );
            roots = nodes.keys().cloned().collect();
        }

        let sort_key: HashMap<SummaryId, String> = nodes
            .values()
            .map(|n| (n.summary_id.clone(), n.created_at.clone()))
            .collect();
        let by_time = |a: &SummaryId, b: &SummaryId| {
            sort_key
                .get(a)
                .cmp(&sort_key.get(b))
                .then_with(|| a.cmp(b))
        };
        roots.sort_by(by_time);
        for node in nodes.values_mut() {
            node.children.sort_by(by_time);
        }

        debug!(conversation_id, nodes = nodes.len(), roots = roots.len(), "summary graph built");
        Self {
            conversation_id,
            nodes,
            roots,
            roots_fallback,
        }
    }

    /// Conversation the graph belongs to.
    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    /// Look up a node.
    pub fn node(&self, id: &SummaryId) -> Option<&SummaryNode> {
        self.nodes.get(id)
    }

    /// All nodes, keyed by ID.
    pub fn nodes(&self) -> &BTreeMap<SummaryId, SummaryNode> {
        &self.nodes
    }

    /// Root IDs in display order.
    pub fn roots(&self) -> &[SummaryId] {
        &self.roots
    }

    /// Whether the every-node-is-a-root policy was applied.
    pub fn roots_fallback(&self) -> bool {
        self.roots_fallback
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the conversation has no summaries.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Flatten the graph for display, depth first from each root.
    ///
    /// Children are listed only under expanded nodes. A node already on the
    /// current root-to-node path is skipped, so cycles end the descent
    /// instead of recursing forever. A node reachable along several paths
    /// appears once per path.
    pub fn rows(&self, expansion: &Expansion) -> Vec<GraphRow> {
        let mut out = Vec::new();
        let mut path: HashSet<&SummaryId> = HashSet::new();
        for root in &self.roots {
            self.walk(root, 0, expansion, &mut path, &mut out);
        }
        out
    }

    fn walk<'a>(
        &'a self,
        id: &'a SummaryId,
        level: usize,
        expansion: &Expansion,
        path: &mut HashSet<&'a SummaryId>,
        out: &mut Vec<GraphRow>,
    ) {
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        if !path.insert(id) {
            return;
        }
        out.push(GraphRow {
            summary_id: id.clone(),
            level,
        });
        if expansion.is_expanded(id) {
            for child in &node.children {
                self.walk(child, level + 1, expansion, path, out);
            }
        }
        let _ = path.remove(id);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
