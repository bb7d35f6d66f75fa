//! Record Store Backends
//!
//! The mapping layer talks to a hierarchical record store through the traits
//! in [`core`]. [`memory`] is a complete in-process implementation of those
//! traits; [`predicate`] is the expression language it evaluates.

pub mod core;
pub mod memory;
pub mod predicate;

// Re-export core traits and types
pub use core::*;
pub use memory::{HistoryEntry, HistoryOperation, MemoryRepository, TableSchema};
