//! Core type definitions for interna.
//!
//! - [`EntryRef`] - packed `(buffer id, offset)` handle into the arena
//! - [`Generation`] - monotonically increasing mutation counter

mod entry_ref;
mod generation;

pub use entry_ref::EntryRef;
pub use generation::Generation;
