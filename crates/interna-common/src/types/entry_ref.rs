//! Compact references into the arena.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Handle to an entry stored in the arena.
///
/// Packs a buffer id and an offset within that buffer into a single `u32`,
/// so it can be kept in large per-document arrays and persisted as a plain
/// integer. The raw value `0` is reserved as [`EntryRef::INVALID`]: offset 0
/// of buffer 0 is never handed out by the allocator.
///
/// An `EntryRef` is never dereferenced directly. Resolve it through the data
/// store (or the enum store built on top of it).
///
/// # Example
///
/// ```
/// use interna_common::EntryRef;
///
/// let entry = EntryRef::new(3, 17);
/// assert_eq!(entry.buffer_id(), 3);
/// assert_eq!(entry.offset(), 17);
/// assert!(entry.is_valid());
/// assert!(!EntryRef::INVALID.is_valid());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntryRef(u32);

impl EntryRef {
    /// The invalid/unset reference.
    pub const INVALID: Self = Self(0);

    /// Number of bits used for the offset within a buffer.
    pub const OFFSET_BITS: u32 = 22;

    /// Number of bits used for the buffer id.
    pub const BUFFER_BITS: u32 = 32 - Self::OFFSET_BITS;

    /// Number of addressable buffers.
    pub const NUM_BUFFERS: u32 = 1 << Self::BUFFER_BITS;

    /// Number of addressable entries in a single buffer.
    pub const MAX_OFFSET: u32 = 1 << Self::OFFSET_BITS;

    const OFFSET_MASK: u32 = Self::MAX_OFFSET - 1;

    /// Creates a reference from a buffer id and an offset.
    ///
    /// # Panics
    ///
    /// Panics in debug builds if either component does not fit its bit field.
    #[inline]
    #[must_use]
    pub const fn new(buffer_id: u32, offset: u32) -> Self {
        debug_assert!(buffer_id < Self::NUM_BUFFERS);
        debug_assert!(offset < Self::MAX_OFFSET);
        Self((buffer_id << Self::OFFSET_BITS) | offset)
    }

    /// Returns the buffer id.
    #[inline]
    #[must_use]
    pub const fn buffer_id(self) -> u32 {
        self.0 >> Self::OFFSET_BITS
    }

    /// Returns the offset within the buffer.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> u32 {
        self.0 & Self::OFFSET_MASK
    }

    /// Returns the packed representation.
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Checks if this reference is set.
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Debug for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "EntryRef({}:{})", self.buffer_id(), self.offset())
        } else {
            write!(f, "EntryRef(INVALID)")
        }
    }
}

impl fmt::Display for EntryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.buffer_id(), self.offset())
    }
}

impl From<u32> for EntryRef {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<EntryRef> for u32 {
    fn from(entry: EntryRef) -> Self {
        entry.0
    }
}
