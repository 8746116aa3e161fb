//! Arena usage accounting.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How much of the arena's addressable space is in use.
///
/// `used` counts every slot handed out so far, including the reserved slot
/// behind [`EntryRef::INVALID`](interna_common::EntryRef::INVALID). `dead`
/// counts slots that hold nothing: freed entries, the reserved slot, and
/// every slot of a buffer retired by compaction. `limit` is the number of
/// slots that could ever be addressed with the current buffers plus the
/// unused buffer ids at full size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AddressSpace {
    /// Slots handed out.
    pub used: u64,
    /// Slots handed out that hold no live entry.
    pub dead: u64,
    /// Upper bound on addressable slots.
    pub limit: u64,
}

impl AddressSpace {
    /// Creates an address space report.
    #[must_use]
    pub const fn new(used: u64, dead: u64, limit: u64) -> Self {
        Self { used, dead, limit }
    }

    /// Returns the number of slots holding live or held entries.
    #[must_use]
    pub const fn live(&self) -> u64 {
        self.used - self.dead
    }

    /// Returns `used / limit`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn usage(&self) -> f64 {
        if self.limit == 0 {
            0.0
        } else {
            self.used as f64 / self.limit as f64
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "used={}, dead={}, limit={}",
            self.used, self.dead, self.limit
        )
    }
}

/// Slot and buffer counts of an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoryUsage {
    /// Capacity of all buffers that are not free.
    pub allocated_entries: u64,
    /// Slots handed out.
    pub used_entries: u64,
    /// Slots that hold nothing.
    pub dead_entries: u64,
    /// Slots retired to a hold list and not yet trimmed.
    pub held_entries: u64,
    /// Buffers in the active state.
    pub active_buffers: u32,
    /// Buffers retired by compaction and not yet trimmed.
    pub held_buffers: u32,
}
