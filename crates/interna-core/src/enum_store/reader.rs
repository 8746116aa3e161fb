//! Reader-side access to an enum store.

use std::sync::Arc;

use interna_common::memory::{GenerationGuard, GenerationHandler};
use interna_common::{EntryRef, Generation, Result};

use super::value::EnumValue;
use crate::datastore::DataStoreReader;
use crate::dictionary::{DictionaryReader, DictionarySnapshot};

/// A handle readers on other threads use to look at an [`EnumStore`].
///
/// Cheap to clone. Every lookup goes through a [`ReadView`], which keeps
/// the values it can reach alive for as long as it exists.
///
/// [`EnumStore`]: super::EnumStore
pub struct EnumStoreReader<T> {
    generation: Arc<GenerationHandler>,
    dict: DictionaryReader<T>,
    store: DataStoreReader<T>,
}

impl<T> Clone for EnumStoreReader<T> {
    fn clone(&self) -> Self {
        Self {
            generation: Arc::clone(&self.generation),
            dict: self.dict.clone(),
            store: self.store.clone(),
        }
    }
}

impl<T: EnumValue> EnumStoreReader<T> {
    pub(super) fn new(
        generation: Arc<GenerationHandler>,
        dict: DictionaryReader<T>,
        store: DataStoreReader<T>,
    ) -> Self {
        Self {
            generation,
            dict,
            store,
        }
    }

    /// Opens a consistent view.
    ///
    /// The guard is taken before the dictionary is pinned, so nothing the
    /// snapshot refers to can be freed while the view is alive.
    #[must_use]
    pub fn read(&self) -> ReadView<T> {
        let guard = self.generation.take_guard();
        let snapshot = self.dict.snapshot();
        ReadView {
            guard,
            snapshot,
            store: self.store.clone(),
        }
    }
}

/// A guarded view of the store as of the last freeze.
pub struct ReadView<T> {
    guard: GenerationGuard,
    snapshot: DictionarySnapshot<T>,
    store: DataStoreReader<T>,
}

impl<T: EnumValue> ReadView<T> {
    /// Returns the generation this view holds.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.guard.generation()
    }

    /// Returns the pinned dictionary.
    #[must_use]
    pub fn snapshot(&self) -> &DictionarySnapshot<T> {
        &self.snapshot
    }

    /// Looks `value` up in the pinned dictionary.
    ///
    /// Answers stay the same for the lifetime of the view, whatever the
    /// writer inserts or removes afterwards.
    #[must_use]
    pub fn find_frozen_index(&self, value: &T) -> Option<EntryRef> {
        self.snapshot.find(value)
    }

    /// Returns the pinned ref and posting list ref of `value`.
    #[must_use]
    pub fn find_posting_list(&self, value: &T) -> Option<(EntryRef, EntryRef)> {
        self.snapshot.find_posting_list(value)
    }

    /// Returns the pinned refs folded-equal to `value`, in dictionary order.
    #[must_use]
    pub fn find_folded_enums(&self, value: &T) -> Vec<EntryRef> {
        self.snapshot.find_matching_folded(value)
    }

    /// Calls `f` with every pinned ref in ascending value order.
    pub fn for_each_key(&self, f: impl FnMut(EntryRef)) {
        self.snapshot.for_each_key(f);
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
    /// # Errors
    ///
    /// Fails like [`get_value`](Self::get_value).
    pub fn get_ref_count(&self, entry: EntryRef) -> Result<u32> {
        self.store.ref_count(entry)
    }
}
