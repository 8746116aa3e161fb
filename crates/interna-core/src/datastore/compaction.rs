//! Buffer selection and ref remapping for compaction.
//!
//! Compaction runs in two phases. `start_compact` copies the live entries of
//! the worst buffers into fresh slots and returns an [`EntryRefRemapper`].
//! Every external owner of refs then runs its refs through the remapper.
//! Only after that does `finish_compact` retire the old buffers.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering};

use interna_common::collections::{InternaMap, InternaSet};
use interna_common::{EntryRef, Error, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::buffer::BufferState;
use super::store::BufferMeta;
use crate::config::CompactionStrategy;

/// Owner slices at least this long are remapped in parallel.
const PARALLEL_REMAP_THRESHOLD: usize = 16 * 1024;

/// Slice length handed to each rayon task.
const REMAP_CHUNK_SIZE: usize = 4 * 1024;

/// Picks compaction candidates, worst first.
pub(crate) fn select_worst_buffers(meta: &[BufferMeta], strategy: &CompactionStrategy) -> Vec<u32> {
    let mut candidates: Vec<(u32, u32, f64)> = meta
        .iter()
        .enumerate()
        .filter(|(_, m)| m.state == BufferState::Active && !m.compacting)
        .filter_map(|(index, m)| {
            #[allow(clippy::cast_possible_truncation)]
            let id = index as u32;
            let reserved = BufferMeta::reserved(id);
            let used = m.used - reserved;
            if used == 0 {
                return None;
            }
            let wasted = m.dead + m.held - reserved;
            let ratio = f64::from(wasted) / f64::from(used);
            (wasted >= strategy.min_dead_entries && ratio >= strategy.max_dead_ratio)
                .then_some((id, wasted, ratio))
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(CmpOrdering::Equal)
            .then_with(|| b.1.cmp(&a.1))
            .then_with(|| a.0.cmp(&b.0))
    });
    candidates.truncate(strategy.max_buffers);
    candidates.into_iter().map(|(id, _, _)| id).collect()
}

/// Summary of a finished compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompactionStats {
    /// Buffers retired.
    pub buffers_compacted: usize,
    /// Entries copied to new slots.
    pub entries_moved: usize,
    /// Owner refs remapped.
    pub remaps_applied: u64,
}

/// Translates refs into compacted buffers to their new location.
///
/// Safe to share across threads while owners remap their refs. The remapper
/// counts every successful remap; with the cross-check enabled,
/// `finish_compact` fails unless at least as many owner refs were remapped as
/// the moved entries' reference counts add up to.
#[derive(Debug)]
pub struct EntryRefRemapper {
    moves: InternaMap<EntryRef, EntryRef>,
    buffers: Vec<u32>,
    buffer_set: InternaSet<u32>,
    expected: u64,
    applied: AtomicU64,
}

impl EntryRefRemapper {
    pub(crate) fn new(moves: InternaMap<EntryRef, EntryRef>, buffers: Vec<u32>, expected: u64) -> Self {
        let buffer_set = buffers.iter().copied().collect();
        Self {
            moves,
            buffers,
            buffer_set,
            expected,
            applied: AtomicU64::new(0),
        }
    }

    /// Returns where `entry` lives after compaction.
    ///
    /// Refs outside the compacted buffers come back unchanged. A ref into a
    /// compacted buffer that was not moved is logged and returned unchanged;
    /// it will dangle once the buffer is freed.
    pub fn remap(&self, entry: EntryRef) -> EntryRef {
        if !entry.is_valid() || !self.buffer_set.contains(&entry.buffer_id()) {
            return entry;
        }
        if let Some(&moved) = self.moves.get(&entry) {
            self.applied.fetch_add(1, Ordering::Relaxed);
            moved
        } else {
            warn!(%entry, "ref into a compacted buffer was not moved");
            entry
        }
    }

    /// Remaps every ref in place. Large slices are split across the rayon pool.
    pub fn remap_all(&self, refs: &mut [EntryRef]) {
        if refs.len() >= PARALLEL_REMAP_THRESHOLD {
            refs.par_chunks_mut(REMAP_CHUNK_SIZE).for_each(|chunk| {
                for entry in chunk {
                    *entry = self.remap(*entry);
                }
            });
        } else {
            for entry in refs {
                *entry = self.remap(*entry);
            }
        }
    }

    /// Looks up a moved ref without counting it as an owner remap.
    pub(crate) fn lookup(&self, entry: EntryRef) -> Option<EntryRef> {
        self.moves.get(&entry).copied()
    }

    /// Checks that owners applied at least the expected number of remaps.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompleteRemap`] otherwise.
    pub fn verify(&self) -> Result<()> {
        let applied = self.applied_remaps();
        if applied < self.expected {
            return Err(Error::IncompleteRemap {
                expected: self.expected,
                applied,
            });
        }
        Ok(())
    }

    /// Returns `true` if `entry` points into a buffer being compacted.
    #[must_use]
    pub fn is_compacted(&self, entry: EntryRef) -> bool {
        entry.is_valid() && self.buffer_set.contains(&entry.buffer_id())
    }

    /// Returns the ids of the buffers being compacted.
    #[must_use]
    pub fn compacted_buffers(&self) -> &[u32] {
        &self.buffers
    }

    /// Returns the number of entries copied.
    #[must_use]
    pub fn moved_entries(&self) -> usize {
        self.moves.len()
    }

    /// Returns the sum of the moved entries' reference counts.
    #[must_use]
    pub fn expected_remaps(&self) -> u64 {
        self.expected
    }

    /// Returns how many owner refs were remapped so far.
    #[must_use]
    pub fn applied_remaps(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use interna_common::collections::interna_map;

    fn meta(used: u32, dead: u32, held: u32) -> BufferMeta {
        BufferMeta {
            state: BufferState::Active,
            capacity: 16,
            used,
            dead,
            held,
            compacting: false,
        }
    }

    fn remapper() -> EntryRefRemapper {
        let mut moves = interna_map();
        moves.insert(EntryRef::new(1, 0), EntryRef::new(2, 0));
        moves.insert(EntryRef::new(1, 3), EntryRef::new(2, 1));
        EntryRefRemapper::new(moves, vec![1], 3)
    }

    #[test]
    fn test_select_orders_worst_first() {
        let buffers = vec![
            meta(9, 1, 0), // only the reserved slot is dead
            meta(10, 5, 0),
            meta(10, 3, 6),
            meta(10, 1, 0),
        ];
        let strategy = CompactionStrategy::default().with_max_buffers(8);
        assert_eq!(select_worst_buffers(&buffers, &strategy), vec![2, 1]);

        let strategy = CompactionStrategy::default();
        assert_eq!(select_worst_buffers(&buffers, &strategy), vec![2]);
    }

    #[test]
    fn test_select_skips_compacting_and_empty() {
        let mut buffers = vec![meta(1, 1, 0), meta(4, 4, 0), meta(0, 0, 0)];
        buffers[1].compacting = true;
        assert!(select_worst_buffers(&buffers, &CompactionStrategy::aggressive()).is_empty());
    }

    #[test]
    fn test_select_respects_min_dead_entries() {
        let buffers = vec![meta(1, 1, 0), meta(4, 2, 0)];
        let strategy = CompactionStrategy::default().with_min_dead_entries(3);
        assert!(select_worst_buffers(&buffers, &strategy).is_empty());
    }

    #[test]
    fn test_remap_counts_moved_refs() {
        let remapper = remapper();
        assert_eq!(remapper.remap(EntryRef::new(1, 0)), EntryRef::new(2, 0));
        assert_eq!(remapper.remap(EntryRef::new(5, 5)), EntryRef::new(5, 5));
        assert_eq!(remapper.remap(EntryRef::INVALID), EntryRef::INVALID);
        // Not moved, so left alone.
        assert_eq!(remapper.remap(EntryRef::new(1, 1)), EntryRef::new(1, 1));
        assert_eq!(remapper.applied_remaps(), 1);
        assert!(matches!(
            remapper.verify(),
            Err(Error::IncompleteRemap {
                expected: 3,
                applied: 1
            })
        ));
    }

    #[test]
    fn test_remap_all_sequential_and_parallel() {
        let remapper = remapper();
        let mut small = vec![EntryRef::new(1, 0), EntryRef::new(1, 3), EntryRef::new(0, 7)];
        remapper.remap_all(&mut small);
        assert_eq!(
            small,
            vec![EntryRef::new(2, 0), EntryRef::new(2, 1), EntryRef::new(0, 7)]
        );
        assert!(remapper.verify().is_err());

        let mut large = vec![EntryRef::new(1, 3); PARALLEL_REMAP_THRESHOLD + 10];
        remapper.remap_all(&mut large);
        assert!(large.iter().all(|e| *e == EntryRef::new(2, 1)));
        assert!(remapper.verify().is_ok());
        assert_eq!(
            remapper.applied_remaps(),
            2 + (PARALLEL_REMAP_THRESHOLD as u64 + 10)
        );
    }
}
