//! The writer façade tying the arena, the dictionary and generations together.

use std::fmt;
use std::sync::Arc;

use interna_common::collections::interna_map_with_capacity;
use interna_common::memory::{GenerationGuard, GenerationHandler};
use interna_common::utils::error::LoadError;
use interna_common::{EntryRef, Error, Generation, Result};
use tracing::debug;

use super::batch::BatchUpdater;
use super::enumerator::Enumerator;
use super::loaders::{EnumeratedLoader, EnumeratedPostingsLoader, NonEnumeratedLoader};
use super::reader::EnumStoreReader;
use super::value::EnumValue;
use crate::config::{CompactionStrategy, DictionaryType, EnumStoreConfig};
use crate::datastore::{AddressSpace, CompactionStats, DataStore, EntryRefRemapper, MemoryUsage};
use crate::dictionary::{DictionarySnapshot, EnumDictionary};

/// Deduplicating, reference-counted value store.
///
/// All mutation goes through `&mut self`; there is exactly one writer.
/// Values stay readable from other threads through [`EnumStore::reader`].
pub struct EnumStore<T> {
    config: EnumStoreConfig,
    pub(super) store: DataStore<T>,
    pub(super) dict: EnumDictionary<T>,
    generation: Arc<GenerationHandler>,
    compacting: Option<Vec<u32>>,
}

impl<T: EnumValue> EnumStore<T> {
    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the configuration is invalid.
    pub fn new(config: EnumStoreConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store: DataStore::new(config.data_store.clone())?,
            dict: EnumDictionary::new(config.dictionary_type),
            generation: Arc::new(GenerationHandler::new()),
            compacting: None,
            config,
        })
    }

    /// Creates an empty store with default sizing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the default configuration is rejected.
    pub fn with_dictionary_type(dictionary_type: DictionaryType) -> Result<Self> {
        Self::new(EnumStoreConfig::default().with_dictionary_type(dictionary_type))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &EnumStoreConfig {
        &self.config
    }

    /// Adds one reference to `value`, storing it if it is new.
    ///
    /// # Panics
    ///
    /// Panics if the arena is exhausted, or if the dictionary points at a
    /// slot that no longer holds a value.
    pub fn insert(&mut self, value: T) -> EntryRef {
        if let Some(entry) = self.dict.find(&value) {
            if let Err(err) = self.store.inc_ref_count(entry) {
                panic!("dictionary entry {entry} for {value:?} is unreadable: {err}");
            }
            return entry;
        }
        let value = Arc::new(value);
        let entry = self.store.allocate_with_ref_count(Arc::clone(&value), 1);
        self.dict.insert(value, entry);
        entry
    }

    /// Looks `value` up in the writer's current dictionary.
    #[must_use]
    pub fn find_index(&self, value: &T) -> Option<EntryRef> {
        self.dict.find(value)
    }

    /// Looks `value` up the way readers do.
    ///
    /// See [`EnumDictionary::find_frozen`].
    #[must_use]
    pub fn find_frozen_index(&self, value: &T) -> Option<EntryRef> {
        self.dict.find_frozen(value)
    }

    /// Returns the frozen refs folded-equal to `value`, in dictionary order.
    #[must_use]
    pub fn find_folded_enums(&self, value: &T) -> Vec<EntryRef> {
        self.dict.find_matching_folded(value)
    }

    /// Returns a copy of the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the ref does not resolve to a stored value.
    pub fn get_value(&self, entry: EntryRef) -> Result<T> {
        self.store.get(entry).map(|value| T::clone(&value))
    }

    /// Runs `f` on the value behind `entry`.
    ///
    /// # Errors
    ///
    /// Fails like [`get_value`](Self::get_value).
    pub fn with_value<R>(&self, entry: EntryRef, f: impl FnOnce(&T) -> R) -> Result<R> {
        self.store.with_value(entry, f)
    }

    /// Returns the reference count of `entry`.
    ///
    /// Removed values report 0 until their hold is trimmed.
    ///
    /// # Errors
    ///
    /// Fails like [`get_value`](Self::get_value).
    pub fn get_ref_count(&self, entry: EntryRef) -> Result<u32> {
        self.store.ref_count(entry)
    }

    /// Starts a batch of reference count changes.
    pub fn make_batch_updater(&mut self) -> BatchUpdater<'_, T> {
        BatchUpdater::new(self)
    }

    /// Publishes the current dictionary to readers.
    pub fn freeze_dictionary(&mut self) {
        self.dict.freeze();
    }

    /// Tags pending holds with `generation`.
    pub fn transfer_hold_lists(&mut self, generation: Generation) {
        self.store.transfer_hold_lists(generation);
    }

    /// Frees holds tagged before `first_used`.
    pub fn trim_hold_lists(&mut self, first_used: Generation) {
        self.store.trim_hold_lists(first_used);
    }

    /// Freezes, retires pending holds, advances the generation and trims.
    ///
    /// Returns the new current generation.
    pub fn commit(&mut self) -> Generation {
        self.freeze_dictionary();
        self.transfer_hold_lists(self.generation.current_generation());
        let generation = self.generation.increment_generation();
        self.trim_hold_lists(self.generation.oldest_used_generation());
        generation
    }

    /// Takes a reader guard at the current generation.
    #[must_use]
    pub fn take_guard(&self) -> GenerationGuard {
        self.generation.take_guard()
    }

    /// Returns the generation handler shared with readers.
    #[must_use]
    pub fn generation_handler(&self) -> &Arc<GenerationHandler> {
        &self.generation
    }

    /// Returns a reader handle that can be sent to other threads.
    #[must_use]
    pub fn reader(&self) -> EnumStoreReader<T> {
        EnumStoreReader::new(
            Arc::clone(&self.generation),
            self.dict.reader(),
            self.store.reader(),
        )
    }

    /// Moves the dictionary's entries out of the worst buffers.
    ///
    /// Returns `None` if no buffer qualifies or a compaction is already
    /// running. Otherwise every owner of refs must run them through the
    /// returned remapper before [`finish_compact`](Self::finish_compact).
    /// The dictionary itself is already remapped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid strategy.
    pub fn start_compact(
        &mut self,
        strategy: &CompactionStrategy,
    ) -> Result<Option<EntryRefRemapper>> {
        strategy.validate()?;
        if self.compacting.is_some() {
            return Ok(None);
        }
        let buffers = self.store.start_compact_worst_buffers(strategy);
        if buffers.is_empty() {
            return Ok(None);
        }

        let targets: Vec<EntryRef> = self
            .dict
            .iter()
            .map(|(_, dict)| dict.entry)
            .filter(|entry| self.store.is_compacting(entry.buffer_id()))
            .collect();
        self.compacting = Some(buffers.clone());

        let mut moves = interna_map_with_capacity(targets.len());
        let mut expected = 0_u64;
        for entry in targets {
            let moved = self.store.move_entry(entry)?;
            expected += u64::from(self.store.ref_count(moved)?);
            moves.insert(entry, moved);
        }
        debug!(
            buffers = ?buffers,
            entries = moves.len(),
            expected_remaps = expected,
            "started compaction"
        );
        let remapper = EntryRefRemapper::new(moves, buffers, expected);
        self.dict.remap(&remapper);
        Ok(Some(remapper))
    }

    /// Retires the buffers compacted by [`start_compact`](Self::start_compact).
    ///
    /// The dictionary is frozen first so new readers only see moved refs.
    /// The old buffers are freed by a later trim.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CompactionNotStarted`] if `remapper` does not belong
    /// to the running compaction, or [`Error::IncompleteRemap`] if the remap
    /// check is enabled and owners remapped fewer refs than expected. The
    /// compaction stays open after an error.
    pub fn finish_compact(&mut self, remapper: &EntryRefRemapper) -> Result<CompactionStats> {
        match self.compacting.as_deref() {
            Some(buffers) if buffers == remapper.compacted_buffers() => {}
            _ => return Err(Error::CompactionNotStarted),
        }
        if self.config.verify_compaction_remap {
            remapper.verify()?;
        }
        let buffers = self.compacting.take().unwrap_or_default();
        self.dict.freeze();
        for &id in &buffers {
            self.store.hold_buffer(id);
        }
        let stats = CompactionStats {
            buffers_compacted: buffers.len(),
            entries_moved: remapper.moved_entries(),
            remaps_applied: remapper.applied_remaps(),
        };
        debug!(
            buffers = stats.buffers_compacted,
            entries = stats.entries_moved,
            remaps = stats.remaps_applied,
            "finished compaction"
        );
        Ok(stats)
    }

    /// Returns `true` while a compaction is open.
    #[must_use]
    pub fn is_compacting(&self) -> bool {
        self.compacting.is_some()
    }

    /// Removes every value whose reference count is 0.
    ///
    /// Returns the number of values removed.
    pub fn free_unused_values(&mut self) -> usize {
        let unused: Vec<EntryRef> = self
            .dict
            .iter()
            .map(|(_, dict)| dict.entry)
            .filter(|&entry| self.store.ref_count(entry).is_ok_and(|count| count == 0))
            .collect();
        self.free_values(&unused)
    }

    /// Removes those of `entries` whose reference count is 0.
    ///
    /// Refs that are not in the dictionary are skipped. Returns the number of
    /// values removed.
    pub fn free_values(&mut self, entries: &[EntryRef]) -> usize {
        let mut freed = 0;
        for &entry in entries {
            if self.remove_if_unused(entry) {
                freed += 1;
            }
        }
        freed
    }

    /// Drops `entry` from the dictionary and holds its slot if its count is 0.
    pub(super) fn remove_if_unused(&mut self, entry: EntryRef) -> bool {
        if self.store.ref_count(entry).ok() != Some(0) {
            return false;
        }
        let Ok(value) = self.store.get(entry) else {
            return false;
        };
        if self.dict.find(&value) != Some(entry) {
            return false;
        }
        self.dict.remove(&value);
        self.store.hold_entry(entry);
        true
    }

    /// Replaces the posting list ref of `value`. See
    /// [`EnumDictionary::update_posting_list`].
    pub fn update_posting_list(
        &mut self,
        entry: EntryRef,
        value: &T,
        f: impl FnOnce(EntryRef) -> EntryRef,
    ) -> EntryRef {
        self.dict.update_posting_list(entry, value, f)
    }

    /// Finds the ref and posting list ref of `value`.
    #[must_use]
    pub fn find_posting_list(
        &self,
        value: &T,
        snapshot: &DictionarySnapshot<T>,
    ) -> Option<(EntryRef, EntryRef)> {
        self.dict.find_posting_list(value, snapshot)
    }

    /// See [`EnumDictionary::check_posting_lists`].
    pub fn check_posting_lists(&mut self, f: impl FnMut(EntryRef) -> EntryRef) -> bool {
        self.dict.check_posting_lists(f)
    }

    /// See [`EnumDictionary::clear_all_posting_lists`].
    pub fn clear_all_posting_lists(&mut self, f: impl FnMut(EntryRef)) {
        self.dict.clear_all_posting_lists(f);
    }

    /// Calls `f` with every frozen ref in ascending value order.
    pub fn for_each_key(&self, f: impl FnMut(EntryRef)) {
        self.dict.for_each_key(f);
    }

    /// Returns the dictionary.
    #[must_use]
    pub fn dictionary(&self) -> &EnumDictionary<T> {
        &self.dict
    }

    /// Reports arena address space usage.
    #[must_use]
    pub fn address_space_usage(&self) -> AddressSpace {
        self.store.address_space_usage()
    }

    /// Reports arena slot and buffer counts.
    #[must_use]
    pub fn memory_usage(&self) -> MemoryUsage {
        self.store.memory_usage()
    }

    /// Returns the number of distinct values in the dictionary.
    #[must_use]
    pub fn num_uniques(&self) -> usize {
        self.dict.len()
    }

    fn ensure_empty(&self) -> Result<()> {
        if self.dict.is_empty() {
            Ok(())
        } else {
            Err(LoadError::StoreNotEmpty.into())
        }
    }

    /// Starts loading unique values whose counts come from a histogram.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::StoreNotEmpty`] unless the store is empty.
    pub fn make_enumerated_loader(&mut self) -> Result<EnumeratedLoader<'_, T>> {
        self.ensure_empty()?;
        Ok(EnumeratedLoader::new(self))
    }

    /// Starts loading unique values together with posting list indexes.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::StoreNotEmpty`] unless the store is empty.
    pub fn make_enumerated_postings_loader(&mut self) -> Result<EnumeratedPostingsLoader<'_, T>> {
        self.ensure_empty()?;
        Ok(EnumeratedPostingsLoader::new(self))
    }

    /// Starts loading values one at a time in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::StoreNotEmpty`] unless the store is empty.
    pub fn make_non_enumerated_loader(&mut self) -> Result<NonEnumeratedLoader<'_, T>> {
        self.ensure_empty()?;
        Ok(NonEnumeratedLoader::new(self))
    }

    /// Numbers the frozen dictionary for a save pass.
    #[must_use]
    pub fn make_enumerator(&self) -> Enumerator<T> {
        Enumerator::new(self.dict.frozen_snapshot())
    }
}

impl<T> fmt::Debug for EnumStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumStore")
            .field("config", &self.config)
            .field("dictionary", &self.dict)
            .field("generation", &self.generation.current_generation())
            .field("compacting", &self.compacting)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DataStoreConfig;

    const TYPES: [DictionaryType; 2] = [DictionaryType::BTree, DictionaryType::BTreeAndHash];

    fn small_config(dictionary_type: DictionaryType) -> EnumStoreConfig {
        EnumStoreConfig::default()
            .with_dictionary_type(dictionary_type)
            .with_data_store(DataStoreConfig::default().with_entries_per_buffer(4, 4))
    }

    fn store<T: EnumValue>(dictionary_type: DictionaryType) -> EnumStore<T> {
        EnumStore::new(small_config(dictionary_type)).unwrap()
    }

    #[test]
    fn test_insert_deduplicates() {
        for dictionary_type in TYPES {
            let mut store = store::<i32>(dictionary_type);
            let a = store.insert(10);
            let b = store.insert(20);
            assert_ne!(a, b);
            assert_eq!(store.insert(10), a);
            assert_eq!(store.get_ref_count(a).unwrap(), 2);
            assert_eq!(store.get_ref_count(b).unwrap(), 1);
            assert_eq!(store.get_value(a).unwrap(), 10);
            assert_eq!(store.find_index(&20), Some(b));
            assert_eq!(store.num_uniques(), 2);
        }
    }

    #[test]
    fn test_nan_is_found_again() {
        for dictionary_type in TYPES {
            let mut store = store::<f64>(dictionary_type);
            let nan = store.insert(f64::NAN);
            assert_eq!(store.find_index(&f64::NAN), Some(nan));
            assert_eq!(store.insert(f64::NAN), nan);
            assert!(store.get_value(nan).unwrap().is_nan());
            assert_ne!(store.insert(0.0), store.insert(-0.0));
        }
    }

    #[test]
    fn test_frozen_index_requires_freeze_without_hash() {
        for dictionary_type in TYPES {
            let mut store = store::<i64>(dictionary_type);
            let entry = store.insert(42);
            let before = store.find_frozen_index(&42);
            if dictionary_type.has_hash() {
                assert_eq!(before, Some(entry));
            } else {
                assert_eq!(before, None);
            }
            store.freeze_dictionary();
            assert_eq!(store.find_frozen_index(&42), Some(entry));
        }
    }

    #[test]
    fn test_commit_frees_after_readers_leave() {
        let mut store = store::<i32>(DictionaryType::BTree);
        let entry = store.insert(7);
        store.commit();
        let guard = store.take_guard();

        let mut batch = store.make_batch_updater();
        batch.dec_ref_count(entry).unwrap();
        batch.commit();
        store.commit();
        assert_eq!(store.find_index(&7), None);
        assert_eq!(store.get_value(entry).unwrap(), 7);

        drop(guard);
        store.commit();
        assert!(matches!(store.get_value(entry), Err(Error::FreedEntry(_))));
    }

    #[test]
    fn test_free_unused_values() {
        let mut store = store::<i32>(DictionaryType::BTreeAndHash);
        let a = store.insert(1);
        let _b = store.insert(2);
        store.store.set_ref_count(a, 0).unwrap();
        assert_eq!(store.free_unused_values(), 1);
        assert_eq!(store.find_index(&1), None);
        assert!(store.find_index(&2).is_some());
        assert_eq!(store.free_values(&[a]), 0);
    }

    #[test]
    fn test_finish_without_start_fails() {
        let mut store = store::<i32>(DictionaryType::BTree);
        store.insert(1);
        assert_eq!(
            store.start_compact(&CompactionStrategy::default()).unwrap().map(|r| r.moved_entries()),
            None
        );
        let remapper = EntryRefRemapper::new(interna_common::collections::interna_map(), vec![0], 0);
        assert!(matches!(
            store.finish_compact(&remapper),
            Err(Error::CompactionNotStarted)
        ));
    }

    #[test]
    fn test_invalid_strategy_is_rejected() {
        let mut store = store::<i32>(DictionaryType::BTree);
        let strategy = CompactionStrategy::default().with_max_dead_ratio(1.5);
        assert!(matches!(store.start_compact(&strategy), Err(Error::Config(_))));
    }

    #[test]
    fn test_loaders_require_empty_store() {
        let mut store = store::<i32>(DictionaryType::BTree);
        store.insert(1);
        assert!(matches!(
            store.make_enumerated_loader(),
            Err(Error::Load(LoadError::StoreNotEmpty))
        ));
        assert!(store.make_non_enumerated_loader().is_err());
    }
}
