//! # lcm-engine
//!
//! Read and rewrite the context ledger.
//!
//! - [`graph`]: reconstructs one conversation's summary DAG for inspection
//! - [`traversal`]: ancestor closure and topological ordering shared by the engines
//! - [`dissolve`]: expands one condensed summary in the active context back into its parents
//! - [`transplant`]: deep-copies a conversation's active summary footprint into another conversation
//!
//! Both engines offer a read-only `plan` and an `apply` that re-validates and
//! mutates inside a single transaction.

#![deny(unsafe_code)]

pub mod dissolve;
pub mod graph;
pub mod transplant;
pub mod traversal;

pub use dissolve::{DissolveEngine, DissolveParent, DissolveReport, DissolveRequest, DissolveTarget};
pub use graph::{Expansion, GraphRow, SummaryGraph, SummaryNode};
pub use transplant::{TopLevelItem, TransplantEngine, TransplantReport, TransplantRequest};
pub use traversal::{ancestor_closure, topological_order};
