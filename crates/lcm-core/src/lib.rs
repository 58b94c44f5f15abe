//! # lcm-core
//!
//! Foundation types shared by every context-ledger crate.
//!
//! - **Summary IDs**: [`SummaryId`], the `sum_` + 16 hex newtype
//! - **Ledger vocabulary**: [`SummaryKind`], [`ContextItemType`], row id aliases
//! - **Collaborators**: [`Clock`] and [`IdSource`], injected into the engines
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` stack

#![deny(unsafe_code)]

pub mod collaborators;
pub mod ids;
pub mod logging;
pub mod types;

pub use collaborators::{Clock, FixedClock, IdSource, RandomIds, ScriptedIds, SystemClock};
pub use ids::{ConversationId, MessageId, SummaryId};
pub use types::{ContextItemType, SummaryKind};
