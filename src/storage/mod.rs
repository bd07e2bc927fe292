//! In-memory key-value storage.
//!
//! A single sharded map holds every entry; values carry an advisory type tag
//! inferred from their first character.

pub mod entry;
pub mod memory;

pub use entry::{Entry, ValueType};
pub use memory::MemoryStore;
