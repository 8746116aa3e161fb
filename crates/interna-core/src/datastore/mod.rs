//! The arena: buffers of reference-counted slots addressed by [`EntryRef`].
//!
//! [`DataStore`] is the single writer's handle. It appends values to a
//! primary buffer, activates a new buffer when that one fills up, and
//! returns freed slots to a free list once their hold is trimmed.
//! [`DataStoreReader`] resolves refs from any thread.
//!
//! | Type | Role |
//! |------|------|
//! | [`DataStore`] | Allocation, ref counts, hold lists, compaction |
//! | [`DataStoreReader`] | Lock-free lookups |
//! | [`EntryRefRemapper`] | Old-to-new ref translation after compaction |
//! | [`AddressSpace`], [`MemoryUsage`] | Usage accounting |
//!
//! [`EntryRef`]: interna_common::EntryRef

mod address_space;
mod buffer;
mod compaction;
mod store;

pub use address_space::{AddressSpace, MemoryUsage};
pub use buffer::BufferState;
pub use compaction::{CompactionStats, EntryRefRemapper};
pub use store::{DataStore, DataStoreReader};
