//! Repositories over the ledger tables.
//!
//! Each repository is a stateless struct whose methods take a `&Connection`,
//! so the same call works on a pooled connection or inside an open
//! transaction (a `Transaction` derefs to `Connection`).

pub mod context_item;
pub mod conversation;
pub mod message;
pub mod summary;

pub use context_item::ContextItemRepo;
pub use conversation::ConversationRepo;
pub use message::MessageRepo;
pub use summary::SummaryRepo;
