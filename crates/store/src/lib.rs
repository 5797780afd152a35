#![warn(clippy::unwrap_used)]

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{LedgerCommit, LedgerStore};
