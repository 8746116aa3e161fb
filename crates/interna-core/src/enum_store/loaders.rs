//! Bulk loading of a saved store.
//!
//! Each loader borrows an empty [`EnumStore`] and fills it in phases:
//!
//! | Loader | Values | Counts | Build |
//! |--------|--------|--------|-------|
//! | [`EnumeratedLoader`] | `load_unique_values` | histogram, `set_ref_counts` | `build_dictionary` |
//! | [`EnumeratedPostingsLoader`] | `load_unique_values` | `set_ref_count` per value | `build_dictionary` with posting indexes |
//! | [`NonEnumeratedLoader`] | `insert` | `set_ref_count_for_last_value` | `build_dictionary` |
//!
//! Phase order is checked in debug builds. A loader dropped before its
//! dictionary is built holds every slot it allocated.

use std::sync::Arc;

use interna_common::utils::error::LoadError;
use interna_common::{EntryRef, Error, Result};
use tracing::debug;

use super::store::EnumStore;
use super::value::EnumValue;
use crate::dictionary::DictEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Values,
    Counts,
    Built,
}

/// Values loaded so far, in load order.
struct Loaded<T> {
    values: Vec<Arc<T>>,
    refs: Vec<EntryRef>,
    phase: Phase,
}

impl<T: EnumValue> Loaded<T> {
    fn new() -> Self {
        Self {
            values: Vec::new(),
            refs: Vec::new(),
            phase: Phase::Values,
        }
    }

    fn advance(&mut self, phase: Phase) {
        debug_assert!(self.phase <= phase, "loader phase {phase:?} after {:?}", self.phase);
        self.phase = phase;
    }

    fn push(&mut self, store: &mut EnumStore<T>, value: T) -> EntryRef {
        let value = Arc::new(value);
        let entry = store.store.allocate(Arc::clone(&value));
        self.values.push(value);
        self.refs.push(entry);
        entry
    }

    fn load_unique_values(&mut self, store: &mut EnumStore<T>, raw: &[u8]) -> Result<usize> {
        debug_assert_eq!(self.phase, Phase::Values, "values must be loaded first");
        let mut offset = 0;
        while offset < raw.len() {
            let (value, consumed) = T::decode_raw(raw, offset)?;
            self.push(store, value);
            offset += consumed;
        }
        Ok(offset)
    }

    fn build(
        &mut self,
        store: &mut EnumStore<T>,
        postings: impl Fn(usize) -> EntryRef,
    ) -> Result<()> {
        debug_assert!(
            self.phase == Phase::Counts || self.refs.is_empty(),
            "dictionary built in phase {:?}, counts must be set first",
            self.phase
        );
        let entries = self
            .values
            .iter()
            .zip(&self.refs)
            .enumerate()
            .map(|(index, (value, &entry))| {
                (Arc::clone(value), DictEntry::with_posting(entry, postings(index)))
            })
            .collect();
        store.dict.build(entries)?;
        self.phase = Phase::Built;
        debug!(
            type_name = T::TYPE_NAME,
            values = self.refs.len(),
            "built dictionary from loaded values"
        );
        self.values.clear();
        Ok(())
    }

    fn abandon(&mut self, store: &mut EnumStore<T>) {
        if self.phase == Phase::Built || self.refs.is_empty() {
            return;
        }
        for &entry in &self.refs {
            store.store.hold_entry(entry);
        }
        debug!(values = self.refs.len(), "discarded unfinished load");
        self.refs.clear();
    }
}

/// Loads unique values and takes their counts from a histogram.
///
/// ```
/// use interna_core::{DictionaryType, EnumStore, encode_values};
///
/// let mut store = EnumStore::<i32>::with_dictionary_type(DictionaryType::BTree).unwrap();
/// let mut loader = store.make_enumerated_loader().unwrap();
/// loader.load_unique_values(&encode_values(&[1, 2])).unwrap();
/// loader.allocate_enums_histogram();
/// loader.enums_histogram_mut().copy_from_slice(&[3, 0]);
/// loader.set_ref_counts().unwrap();
/// loader.build_dictionary().unwrap();
/// loader.free_unused_values();
/// drop(loader);
/// assert_eq!(store.num_uniques(), 1);
/// ```
pub struct EnumeratedLoader<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    loaded: Loaded<T>,
    histogram: Vec<u32>,
}

impl<'a, T: EnumValue> EnumeratedLoader<'a, T> {
    pub(super) fn new(store: &'a mut EnumStore<T>) -> Self {
        Self {
            store,
            loaded: Loaded::new(),
            histogram: Vec::new(),
        }
    }

    /// Decodes back-to-back raw values and returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Returns a load error if the input ends inside a value or a value is
    /// malformed. Values before the bad one stay loaded.
    pub fn load_unique_values(&mut self, raw: &[u8]) -> Result<usize> {
        self.loaded.load_unique_values(self.store, raw)
    }

    /// Returns the refs of the loaded values, in load order.
    #[must_use]
    pub fn enum_indexes(&self) -> &[EntryRef] {
        &self.loaded.refs
    }

    /// Allocates one zeroed counter per loaded value.
    pub fn allocate_enums_histogram(&mut self) {
        self.loaded.advance(Phase::Counts);
        self.histogram = vec![0; self.loaded.refs.len()];
    }

    /// Returns the counters, indexed like [`enum_indexes`](Self::enum_indexes).
    pub fn enums_histogram_mut(&mut self) -> &mut [u32] {
        &mut self.histogram
    }

    /// Copies the counters into the arena.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::LengthMismatch`] if the histogram was not
    /// allocated for the loaded values.
    pub fn set_ref_counts(&mut self) -> Result<()> {
        self.loaded.advance(Phase::Counts);
        if self.histogram.len() != self.loaded.refs.len() {
            return Err(LoadError::LengthMismatch {
                expected: self.loaded.refs.len(),
                actual: self.histogram.len(),
            }
            .into());
        }
        for (&entry, &count) in self.loaded.refs.iter().zip(&self.histogram) {
            self.store.store.set_ref_count(entry, count)?;
        }
        Ok(())
    }

    /// Builds the dictionary from the loaded values.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DuplicateValue`] if two loaded values are equal.
    ///
    /// [`LoadError::DuplicateValue`]: interna_common::utils::error::LoadError::DuplicateValue
    pub fn build_dictionary(&mut self) -> Result<()> {
        self.histogram = Vec::new();
        self.loaded.build(self.store, |_| EntryRef::INVALID)
    }

    /// Removes loaded values that ended up with no references.
    pub fn free_unused_values(&mut self) -> usize {
        debug_assert_eq!(self.loaded.phase, Phase::Built);
        self.store.free_unused_values()
    }
}

impl<T: EnumValue> Drop for EnumeratedLoader<'_, T> {
    fn drop(&mut self) {
        self.loaded.abandon(self.store);
    }
}

/// Loads unique values with per-value counts and posting list indexes.
pub struct EnumeratedPostingsLoader<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    loaded: Loaded<T>,
    posting_indexes: Vec<u32>,
}

impl<'a, T: EnumValue> EnumeratedPostingsLoader<'a, T> {
    pub(super) fn new(store: &'a mut EnumStore<T>) -> Self {
        Self {
            store,
            loaded: Loaded::new(),
            posting_indexes: Vec::new(),
        }
    }

    /// Decodes back-to-back raw values and returns the number of bytes read.
    ///
    /// # Errors
    ///
    /// Fails like [`EnumeratedLoader::load_unique_values`].
    pub fn load_unique_values(&mut self, raw: &[u8]) -> Result<usize> {
        self.loaded.load_unique_values(self.store, raw)
    }

    /// Returns the refs of the loaded values, in load order.
    #[must_use]
    pub fn enum_indexes(&self) -> &[EntryRef] {
        &self.loaded.refs
    }

    /// Sets the reference count of one loaded value.
    ///
    /// # Errors
    ///
    /// Fails if `entry` does not resolve to a stored value.
    pub fn set_ref_count(&mut self, entry: EntryRef, count: u32) -> Result<()> {
        self.loaded.advance(Phase::Counts);
        self.store.store.set_ref_count(entry, count)
    }

    /// Allocates one zeroed posting index per loaded value.
    ///
    /// Index 0 means no posting list.
    pub fn initialize_empty_posting_indexes(&mut self) -> &mut [u32] {
        self.loaded.advance(Phase::Counts);
        self.posting_indexes = vec![0; self.loaded.refs.len()];
        &mut self.posting_indexes
    }

    /// Returns `true` if `rhs` starts a new folded group after `lhs`.
    ///
    /// # Errors
    ///
    /// Fails if either ref does not resolve to a stored value.
    pub fn is_folded_change(&self, lhs: EntryRef, rhs: EntryRef) -> Result<bool> {
        let lhs = self.store.store.get(lhs)?;
        let rhs = self.store.store.get(rhs)?;
        Ok(lhs.compare_folded(&rhs).is_lt())
    }

    /// Builds the dictionary, attaching the posting indexes.
    ///
    /// # Errors
    ///
    /// Fails like [`EnumeratedLoader::build_dictionary`].
    pub fn build_dictionary(&mut self) -> Result<()> {
        let postings = std::mem::take(&mut self.posting_indexes);
        self.loaded.build(self.store, |index| {
            postings
                .get(index)
                .map_or(EntryRef::INVALID, |&posting| EntryRef::from(posting))
        })
    }

    /// Removes loaded values that ended up with no references.
    pub fn free_unused_values(&mut self) -> usize {
        debug_assert_eq!(self.loaded.phase, Phase::Built);
        self.store.free_unused_values()
    }
}

impl<T: EnumValue> Drop for EnumeratedPostingsLoader<'_, T> {
    fn drop(&mut self) {
        self.loaded.abandon(self.store);
    }
}

/// Loads values one at a time, each with a posting list index.
///
/// Values with no references are dropped when the dictionary is built.
pub struct NonEnumeratedLoader<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    loaded: Loaded<T>,
    posting_indexes: Vec<u32>,
}

impl<'a, T: EnumValue> NonEnumeratedLoader<'a, T> {
    pub(super) fn new(store: &'a mut EnumStore<T>) -> Self {
        Self {
            store,
            loaded: Loaded::new(),
            posting_indexes: Vec::new(),
        }
    }

    /// Stores `value` with its posting list index and returns its ref.
    pub fn insert(&mut self, value: T, posting_idx: u32) -> EntryRef {
        debug_assert_ne!(self.loaded.phase, Phase::Built);
        self.posting_indexes.push(posting_idx);
        self.loaded.push(self.store, value)
    }

    /// Sets the reference count of the most recently inserted value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRef`] if nothing has been inserted yet.
    pub fn set_ref_count_for_last_value(&mut self, count: u32) -> Result<()> {
        self.loaded.advance(Phase::Counts);
        let entry = self.loaded.refs.last().copied().ok_or(Error::InvalidRef)?;
        self.store.store.set_ref_count(entry, count)
    }

    /// Builds the dictionary and drops values with no references.
    ///
    /// # Errors
    ///
    /// Fails like [`EnumeratedLoader::build_dictionary`].
    pub fn build_dictionary(&mut self) -> Result<()> {
        let postings = std::mem::take(&mut self.posting_indexes);
        self.loaded.build(self.store, |index| {
            postings
                .get(index)
                .map_or(EntryRef::INVALID, |&posting| EntryRef::from(posting))
        })?;
        self.store.free_unused_values();
        Ok(())
    }
}

impl<T: EnumValue> Drop for NonEnumeratedLoader<'_, T> {
    fn drop(&mut self) {
        self.loaded.abandon(self.store);
    }
}
