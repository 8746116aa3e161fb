//! The arena writer and its lock-free reader.

use std::sync::Arc;

use arc_swap::ArcSwap;
use interna_common::memory::GenerationHolder;
use interna_common::{EntryRef, Error, Generation, Result};
use tracing::{debug, trace};

use super::address_space::{AddressSpace, MemoryUsage};
use super::buffer::{Buffer, BufferState, BufferTable, resolve};
use super::compaction::select_worst_buffers;
use crate::config::{CompactionStrategy, DataStoreConfig};

/// Writer-side bookkeeping for one buffer id.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct BufferMeta {
    pub(crate) state: BufferState,
    pub(crate) capacity: u32,
    /// Slots handed out, including the reserved slot of buffer 0.
    pub(crate) used: u32,
    /// Slots holding nothing.
    pub(crate) dead: u32,
    /// Slots waiting on the entry hold list.
    pub(crate) held: u32,
    pub(crate) compacting: bool,
}

impl BufferMeta {
    /// Slots at the front of the buffer that are never handed out.
    pub(crate) const fn reserved(id: u32) -> u32 {
        if id == 0 { 1 } else { 0 }
    }
}

/// Growable arena of fixed-capacity buffers.
///
/// The single writer owns the `DataStore`. Readers get a
/// [`DataStoreReader`], which resolves refs through an atomically published
/// buffer table without ever taking a lock.
///
/// Slots are never reused or dropped directly. [`hold_entry`](Self::hold_entry)
/// queues a slot, and only [`trim_hold_lists`](Self::trim_hold_lists) past the
/// generation the slot was retired in drops its value.
///
/// # Panics
///
/// [`allocate`](Self::allocate) panics when every buffer id is in use. The
/// arena is sized for bounded, monitored growth; running out is fatal.
pub struct DataStore<T> {
    config: DataStoreConfig,
    /// Writer copy of the published table.
    buffers: Vec<Option<Arc<Buffer<T>>>>,
    meta: Vec<BufferMeta>,
    table: Arc<ArcSwap<BufferTable<T>>>,
    primary: u32,
    free_list: Vec<EntryRef>,
    entry_holds: GenerationHolder<EntryRef>,
    buffer_holds: GenerationHolder<u32>,
}

impl<T: Send + Sync + 'static> DataStore<T> {
    /// Creates an arena with its first buffer active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: DataStoreConfig) -> Result<Self> {
        config.validate()?;
        let max_buffers = config.max_buffers as usize;
        let mut store = Self {
            buffers: vec![None; max_buffers],
            meta: vec![BufferMeta::default(); max_buffers],
            table: Arc::new(ArcSwap::from_pointee(BufferTable::new(Vec::new()))),
            primary: 0,
            free_list: Vec::new(),
            entry_holds: GenerationHolder::new(),
            buffer_holds: GenerationHolder::new(),
            config,
        };
        store.primary = store.activate_buffer();
        Ok(store)
    }

    /// Returns a reader handle that can be sent to other threads.
    #[must_use]
    pub fn reader(&self) -> DataStoreReader<T> {
        DataStoreReader {
            table: Arc::clone(&self.table),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &DataStoreConfig {
        &self.config
    }

    /// Stores a value and returns its ref. The slot starts with ref count 0.
    ///
    /// # Panics
    ///
    /// Panics if a new buffer is needed and no buffer id is free.
    pub fn allocate(&mut self, value: Arc<T>) -> EntryRef {
        if self.config.enable_free_lists {
            while let Some(entry) = self.free_list.pop() {
                if let Ok(slot) = resolve(&self.buffers, entry) {
                    slot.set_ref_count(0);
                    slot.store_value(Some(value));
                    self.meta[entry.buffer_id() as usize].dead -= 1;
                    return entry;
                }
            }
        }

        if self.primary_buffer().is_none_or(|buffer| buffer.is_full()) {
            self.primary = self.activate_buffer();
        }
        let id = self.primary;
        let offset = match self.primary_buffer() {
            Some(buffer) => buffer.push(value),
            None => unreachable!("primary buffer {id} was just activated"),
        };
        self.meta[id as usize].used += 1;
        EntryRef::new(id, offset)
    }

    /// Stores a value with an initial reference count.
    ///
    /// # Panics
    ///
    /// Panics like [`allocate`](Self::allocate).
    pub fn allocate_with_ref_count(&mut self, value: Arc<T>, count: u32) -> EntryRef {
        let entry = self.allocate(value);
        if let Ok(slot) = resolve(&self.buffers, entry) {
            slot.set_ref_count(count);
        }
        entry
    }

    fn primary_buffer(&self) -> Option<&Arc<Buffer<T>>> {
        self.buffers[self.primary as usize].as_ref()
    }

    /// Activates the lowest free buffer id and returns it.
    fn activate_buffer(&mut self) -> u32 {
        let Some(index) = self
            .meta
            .iter()
            .position(|meta| meta.state == BufferState::Free)
        else {
            panic!(
                "arena exhausted: all {} buffer ids are in use",
                self.config.max_buffers
            );
        };
        #[allow(clippy::cast_possible_truncation)]
        let id = index as u32;
        let reserved = BufferMeta::reserved(id);
        let capacity = self.next_buffer_capacity().max(reserved + 1);

        self.buffers[index] = Some(Arc::new(Buffer::with_capacity(capacity, reserved)));
        self.meta[index] = BufferMeta {
            state: BufferState::Active,
            capacity,
            used: reserved,
            dead: reserved,
            held: 0,
            compacting: false,
        };
        self.publish();
        debug!(buffer_id = id, capacity, "activated buffer");
        id
    }

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn next_buffer_capacity(&self) -> u32 {
        let live: u64 = self
            .meta
            .iter()
            .filter(|meta| meta.state == BufferState::Active)
            .map(|meta| u64::from(meta.used - meta.dead))
            .sum();
        let wanted = (live as f64 * self.config.grow_factor) as u64;
        wanted.clamp(
            u64::from(self.config.min_entries_per_buffer),
            u64::from(self.config.max_entries_per_buffer),
        ) as u32
    }

    fn publish(&self) {
        self.table
            .store(Arc::new(BufferTable::new(self.buffers.clone())));
    }

    /// Returns the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the ref is invalid, out of range, or its slot was freed.
    pub fn get(&self, entry: EntryRef) -> Result<Arc<T>> {
        resolve(&self.buffers, entry)?
            .value()
            .ok_or(Error::FreedEntry(entry))
    }

    /// Runs `f` on the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn with_value<R>(&self, entry: EntryRef, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.get(entry).map(|value| f(&value))
    }

    /// Returns the reference count of `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn ref_count(&self, entry: EntryRef) -> Result<u32> {
        let slot = resolve(&self.buffers, entry)?;
        if !slot.has_value() {
            return Err(Error::FreedEntry(entry));
        }
        Ok(slot.ref_count())
    }

    /// Sets the reference count of `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn set_ref_count(&mut self, entry: EntryRef, count: u32) -> Result<()> {
        let slot = resolve(&self.buffers, entry)?;
        if !slot.has_value() {
            return Err(Error::FreedEntry(entry));
        }
        slot.set_ref_count(count);
        Ok(())
    }

    /// Increments the reference count and returns the new value.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn inc_ref_count(&mut self, entry: EntryRef) -> Result<u32> {
        let count = self.ref_count(entry)? + 1;
        self.set_ref_count(entry, count)?;
        Ok(count)
    }

    /// Decrements the reference count and returns the new value.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    ///
    /// # Panics
    ///
    /// Panics if the count is already zero.
    pub fn dec_ref_count(&mut self, entry: EntryRef) -> Result<u32> {
        let current = self.ref_count(entry)?;
        let Some(count) = current.checked_sub(1) else {
            panic!("reference count of {entry} would go negative");
        };
        self.set_ref_count(entry, count)?;
        Ok(count)
    }

    /// Retires a slot. Its value stays readable until the hold is trimmed.
    pub fn hold_entry(&mut self, entry: EntryRef) {
        debug_assert!(entry.is_valid(), "cannot hold the invalid ref");
        let Some(meta) = self.meta.get_mut(entry.buffer_id() as usize) else {
            return;
        };
        // A retired buffer drops all of its slots at once.
        if meta.state != BufferState::Active {
            return;
        }
        meta.held += 1;
        self.entry_holds.hold(entry);
    }

    /// Tags everything retired since the last transfer with `generation`.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        self.entry_holds.transfer_hold_lists(generation);
        self.buffer_holds.transfer_hold_lists(generation);
    }

    /// Frees every hold tagged with a generation older than `first_used`.
    pub fn trim_hold_lists(&mut self, first_used: Generation) {
        let mut entries = Vec::new();
        self.entry_holds
            .trim_hold_lists(first_used, |entry| entries.push(entry));
        for &entry in &entries {
            self.free_entry(entry);
        }

        let mut buffer_ids = Vec::new();
        self.buffer_holds
            .trim_hold_lists(first_used, |id| buffer_ids.push(id));
        for &id in &buffer_ids {
            self.free_buffer(id);
        }
        if !buffer_ids.is_empty() {
            self.publish();
        }

        if !entries.is_empty() || !buffer_ids.is_empty() {
            trace!(
                generation = first_used.as_u64(),
                entries = entries.len(),
                buffers = buffer_ids.len(),
                "trimmed hold lists"
            );
        }
    }

    fn free_entry(&mut self, entry: EntryRef) {
        let index = entry.buffer_id() as usize;
        let state = self.meta[index].state;
        if state == BufferState::Free {
            return;
        }
        if let Ok(slot) = resolve(&self.buffers, entry) {
            slot.store_value(None);
            slot.set_ref_count(0);
        }
        if state == BufferState::Active {
            let meta = &mut self.meta[index];
            meta.held -= 1;
            meta.dead += 1;
            if self.config.enable_free_lists && !meta.compacting {
                self.free_list.push(entry);
            }
        }
    }

    fn free_buffer(&mut self, id: u32) {
        let index = id as usize;
        debug_assert_eq!(self.meta[index].state, BufferState::Hold);
        self.buffers[index] = None;
        self.meta[index] = BufferMeta::default();
        debug!(buffer_id = id, "freed buffer");
    }

    /// Marks the most wasteful buffers for compaction and returns their ids.
    ///
    /// Their slots are removed from the free list, and a fresh primary buffer
    /// is activated if the current one was picked.
    pub fn start_compact_worst_buffers(&mut self, strategy: &CompactionStrategy) -> Vec<u32> {
        let ids = select_worst_buffers(&self.meta, strategy);
        if ids.is_empty() {
            return ids;
        }
        for &id in &ids {
            self.meta[id as usize].compacting = true;
        }
        let meta = &self.meta;
        self.free_list
            .retain(|entry| !meta[entry.buffer_id() as usize].compacting);
        if self.meta[self.primary as usize].compacting {
            self.primary = self.activate_buffer();
        }
        ids
    }

    /// Returns `true` if the buffer is marked for compaction.
    #[must_use]
    pub fn is_compacting(&self, buffer_id: u32) -> bool {
        self.meta
            .get(buffer_id as usize)
            .is_some_and(|meta| meta.compacting)
    }

    /// Copies an entry, ref count included, into a fresh slot.
    ///
    /// The old slot keeps its value so readers holding the old ref still
    /// resolve it.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn move_entry(&mut self, entry: EntryRef) -> Result<EntryRef> {
        let slot = resolve(&self.buffers, entry)?;
        let value = slot.value().ok_or(Error::FreedEntry(entry))?;
        let count = slot.ref_count();
        let moved = self.allocate(value);
        self.set_ref_count(moved, count)?;
        Ok(moved)
    }

    /// Retires a compacted buffer. It is freed by a later trim.
    pub fn hold_buffer(&mut self, buffer_id: u32) {
        let meta = &mut self.meta[buffer_id as usize];
        debug_assert_eq!(meta.state, BufferState::Active);
        meta.state = BufferState::Hold;
        meta.compacting = false;
        meta.dead = meta.used;
        meta.held = 0;
        self.buffer_holds.hold(buffer_id);
    }

    /// Returns the state of a buffer id.
    #[must_use]
    pub fn buffer_state(&self, buffer_id: u32) -> BufferState {
        self.meta
            .get(buffer_id as usize)
            .map_or(BufferState::Free, |meta| meta.state)
    }

    /// Returns the buffer new entries are appended to.
    #[must_use]
    pub fn primary_buffer_id(&self) -> u32 {
        self.primary
    }

    /// Returns the number of retired items not yet freed.
    #[must_use]
    pub fn pending_holds(&self) -> usize {
        self.entry_holds.pending_len()
            + self.entry_holds.held_len()
            + self.buffer_holds.pending_len()
            + self.buffer_holds.held_len()
    }

    /// Reports address space usage.
    #[must_use]
    pub fn address_space_usage(&self) -> AddressSpace {
        let mut space = AddressSpace::default();
        let mut in_use = 0_u64;
        for meta in self.meta.iter().filter(|m| m.state != BufferState::Free) {
            space.used += u64::from(meta.used);
            space.dead += u64::from(meta.dead);
            space.limit += u64::from(meta.capacity);
            in_use += 1;
        }
        let unused = u64::from(self.config.max_buffers) - in_use;
        space.limit += unused * u64::from(self.config.max_entries_per_buffer);
        space
    }

    /// Reports slot and buffer counts.
    #[must_use]
    pub fn memory_usage(&self) -> MemoryUsage {
        let mut usage = MemoryUsage::default();
        for meta in self.meta.iter().filter(|m| m.state != BufferState::Free) {
            usage.allocated_entries += u64::from(meta.capacity);
            usage.used_entries += u64::from(meta.used);
            usage.dead_entries += u64::from(meta.dead);
            usage.held_entries += u64::from(meta.held);
            match meta.state {
                BufferState::Active => usage.active_buffers += 1,
                BufferState::Hold => usage.held_buffers += 1,
                BufferState::Free => {}
            }
        }
        usage
    }

    pub(crate) fn buffer_meta(&self) -> &[BufferMeta] {
        &self.meta
    }
}

/// Read handle for a [`DataStore`].
///
/// Cheap to clone. Resolving a ref loads the current buffer table with a
/// single atomic operation.
pub struct DataStoreReader<T> {
    table: Arc<ArcSwap<BufferTable<T>>>,
}

impl<T> Clone for DataStoreReader<T> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T> DataStoreReader<T> {
    /// Returns the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the ref is invalid, out of range, or its slot was freed.
    pub fn get(&self, entry: EntryRef) -> Result<Arc<T>> {
        self.table
            .load()
            .slot(entry)?
            .value()
            .ok_or(Error::FreedEntry(entry))
    }

    /// Runs `f` on the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn with_value<R>(&self, entry: EntryRef, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.get(entry).map(|value| f(&value))
    }

    /// Returns the reference count of `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get`](Self::get).
    pub fn ref_count(&self, entry: EntryRef) -> Result<u32> {
        let table = self.table.load();
        let slot = table.slot(entry)?;
        if !slot.has_value() {
            return Err(Error::FreedEntry(entry));
        }
        Ok(slot.ref_count())
    }
}
