//! Ordered dictionary from stored values to arena refs.
//!
//! The writer mutates a live tree. [`EnumDictionary::freeze`] publishes that
//! tree to readers in O(1) by swapping an `Arc`; the next mutation clones it
//! once and carries on, so a published tree is never modified. Readers pin a
//! published tree as a [`DictionarySnapshot`].
//!
//! With [`DictionaryType::BTreeAndHash`] a concurrent hash index sits next to
//! the tree. The writer updates it eagerly, and `find_frozen` and
//! `find_posting_list` consult it before the tree.

mod hash;
mod key;
mod snapshot;

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;
use interna_common::EntryRef;
use interna_common::utils::error::LoadError;

use self::hash::HashIndex;
use self::key::{Tree, tree_get};
use crate::config::DictionaryType;
use crate::datastore::EntryRefRemapper;
use crate::enum_store::EnumValue;

pub use self::key::DictEntry;
pub(crate) use self::key::{DictKey, Probe};
pub use self::snapshot::DictionarySnapshot;

/// The writer's dictionary.
pub struct EnumDictionary<T> {
    dictionary_type: DictionaryType,
    live: Arc<Tree<T>>,
    frozen: Arc<ArcSwap<Tree<T>>>,
    hash: Option<Arc<HashIndex<T>>>,
}

impl<T: EnumValue> EnumDictionary<T> {
    /// Creates an empty dictionary.
    #[must_use]
    pub fn new(dictionary_type: DictionaryType) -> Self {
        let live = Arc::new(Tree::new());
        Self {
            dictionary_type,
            frozen: Arc::new(ArcSwap::new(Arc::clone(&live))),
            live,
            hash: dictionary_type
                .has_hash()
                .then(|| Arc::new(HashIndex::new())),
        }
    }

    /// Returns the dictionary variant.
    #[must_use]
    pub fn dictionary_type(&self) -> DictionaryType {
        self.dictionary_type
    }

    /// Returns a reader handle that can be sent to other threads.
    #[must_use]
    pub fn reader(&self) -> DictionaryReader<T> {
        DictionaryReader {
            frozen: Arc::clone(&self.frozen),
            hash: self.hash.clone(),
        }
    }

    fn live_mut(&mut self) -> &mut Tree<T> {
        Arc::make_mut(&mut self.live)
    }

    /// Finds `value` in the live dictionary.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<EntryRef> {
        self.find_entry(value).map(|dict| dict.entry)
    }

    /// Finds the full live entry for `value`.
    #[must_use]
    pub fn find_entry(&self, value: &T) -> Option<DictEntry> {
        match &self.hash {
            Some(hash) => hash.find(value),
            None => tree_get(&self.live, value).copied(),
        }
    }

    /// Finds `value` in what readers see.
    ///
    /// Without a hash index this is the last frozen tree. With one, the hash
    /// index answers and may already reflect unfrozen inserts.
    #[must_use]
    pub fn find_frozen(&self, value: &T) -> Option<EntryRef> {
        self.reader().find_frozen(value)
    }

    /// Adds a key.
    ///
    /// # Panics
    ///
    /// Panics if an equal key exists. Callers must `find` first.
    pub fn insert(&mut self, value: Arc<T>, entry: EntryRef) {
        let dict = DictEntry::new(entry);
        if let Some(hash) = &self.hash {
            hash.insert(Arc::clone(&value), dict);
        }
        let key = DictKey(value);
        if self.live_mut().insert(key.clone(), dict).is_some() {
            panic!("duplicate dictionary key {key:?}");
        }
    }

    /// Removes a key and returns its entry.
    pub fn remove(&mut self, value: &T) -> Option<DictEntry> {
        if let Some(hash) = &self.hash {
            hash.remove(value);
        }
        if tree_get(&self.live, value).is_none() {
            return None;
        }
        self.live_mut()
            .remove(Probe::Exact(value).as_dyn())
    }

    /// Publishes the live tree to readers.
    pub fn freeze(&mut self) {
        self.frozen.store(Arc::clone(&self.live));
    }

    /// Returns the tree readers currently see.
    #[must_use]
    pub fn frozen_snapshot(&self) -> DictionarySnapshot<T> {
        DictionarySnapshot::new(self.frozen.load_full())
    }

    /// Replaces the posting list ref of `value` with `f(old)` and returns the old one.
    ///
    /// # Panics
    ///
    /// Panics if `value` is not in the live dictionary.
    pub fn update_posting_list(
        &mut self,
        entry: EntryRef,
        value: &T,
        f: impl FnOnce(EntryRef) -> EntryRef,
    ) -> EntryRef {
        let Some(dict) = self.live_mut().get_mut(Probe::Exact(value).as_dyn()) else {
            panic!("update_posting_list on missing key {value:?}");
        };
        debug_assert_eq!(dict.entry, entry, "ref does not match stored entry");
        let old = dict.posting;
        let new = f(old);
        dict.posting = new;
        if let Some(hash) = &self.hash {
            hash.update(value, |d| d.posting = new);
        }
        old
    }

    /// Returns every frozen key folded-equal to `value`, in key order.
    #[must_use]
    pub fn find_matching_folded(&self, value: &T) -> Vec<EntryRef> {
        self.frozen_snapshot().find_matching_folded(value)
    }

    /// Finds the ref and posting list ref of `value`.
    ///
    /// Consults the hash index if there is one, otherwise `snapshot`.
    #[must_use]
    pub fn find_posting_list(
        &self,
        value: &T,
        snapshot: &DictionarySnapshot<T>,
    ) -> Option<(EntryRef, EntryRef)> {
        self.reader().find_posting_list(value, snapshot)
    }

    /// Runs every posting list ref through `f` and stores the result.
    ///
    /// `f` is called exactly once per key. Returns `true` if any ref changed.
    pub fn check_posting_lists(&mut self, mut f: impl FnMut(EntryRef) -> EntryRef) -> bool {
        let changes: Vec<(Arc<T>, EntryRef)> = self
            .live
            .iter()
            .filter_map(|(key, dict)| {
                let new = f(dict.posting);
                (new != dict.posting).then(|| (Arc::clone(&key.0), new))
            })
            .collect();
        self.set_postings(&changes);
        !changes.is_empty()
    }

    /// Hands every set posting list ref to `f` and resets it.
    pub fn clear_all_posting_lists(&mut self, mut f: impl FnMut(EntryRef)) {
        let changes: Vec<(Arc<T>, EntryRef)> = self
            .live
            .iter()
            .filter(|(_, dict)| dict.posting.is_valid())
            .map(|(key, dict)| {
                f(dict.posting);
                (Arc::clone(&key.0), EntryRef::INVALID)
            })
            .collect();
        self.set_postings(&changes);
    }

    fn set_postings(&mut self, changes: &[(Arc<T>, EntryRef)]) {
        if changes.is_empty() {
            return;
        }
        let tree = self.live_mut();
        for (value, posting) in changes {
            if let Some(dict) = tree.get_mut(Probe::Exact(&**value).as_dyn()) {
                dict.posting = *posting;
            }
        }
        if let Some(hash) = &self.hash {
            for (value, posting) in changes {
                hash.update(value, |d| d.posting = *posting);
            }
        }
    }

    /// Calls `f` with every frozen ref in ascending key order.
    pub fn for_each_key(&self, f: impl FnMut(EntryRef)) {
        self.frozen_snapshot().for_each_key(f);
    }

    /// Points every moved entry at its new location.
    pub fn remap(&mut self, remapper: &EntryRefRemapper) {
        let moved = self
            .live
            .values()
            .any(|dict| remapper.lookup(dict.entry).is_some());
        if moved {
            for dict in self.live_mut().values_mut() {
                if let Some(new) = remapper.lookup(dict.entry) {
                    dict.entry = new;
                }
            }
        }
        if let Some(hash) = &self.hash {
            hash.for_each_mut(|dict| {
                if let Some(new) = remapper.lookup(dict.entry) {
                    dict.entry = new;
                }
            });
        }
    }

    /// Replaces the contents with `entries`, given in load order.
    ///
    /// Sorts when the input is not already ascending.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::DuplicateValue`] with the load index of the
    /// later of two equal values.
    pub fn build(&mut self, entries: Vec<(Arc<T>, DictEntry)>) -> Result<(), LoadError> {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        let sorted = entries
            .windows(2)
            .all(|pair| pair[0].0.compare(&pair[1].0).is_lt());
        if !sorted {
            order.sort_by(|&a, &b| entries[a].0.compare(&entries[b].0));
            if let Some(pair) = order
                .windows(2)
                .find(|pair| entries[pair[0]].0.compare(&entries[pair[1]].0).is_eq())
            {
                return Err(LoadError::DuplicateValue { index: pair[1] });
            }
        }

        if let Some(hash) = &self.hash {
            for (value, dict) in &entries {
                hash.insert(Arc::clone(value), *dict);
            }
        }
        let mut slots: Vec<Option<(Arc<T>, DictEntry)>> = entries.into_iter().map(Some).collect();
        let tree: Tree<T> = order
            .into_iter()
            .filter_map(|index| slots[index].take())
            .map(|(value, dict)| (DictKey(value), dict))
            .collect();
        self.live = Arc::new(tree);
        Ok(())
    }

    /// Iterates over the live tree in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, DictEntry)> {
        self.live.iter().map(|(key, dict)| (key.value(), *dict))
    }

    /// Returns the number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    /// Returns `true` if the live dictionary is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl<T> fmt::Debug for EnumDictionary<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EnumDictionary")
            .field("dictionary_type", &self.dictionary_type)
            .field("len", &self.live.len())
            .finish_non_exhaustive()
    }
}

/// Read handle for an [`EnumDictionary`].
pub struct DictionaryReader<T> {
    frozen: Arc<ArcSwap<Tree<T>>>,
    hash: Option<Arc<HashIndex<T>>>,
}

impl<T> Clone for DictionaryReader<T> {
    fn clone(&self) -> Self {
        Self {
            frozen: Arc::clone(&self.frozen),
            hash: self.hash.clone(),
        }
    }
}

impl<T: EnumValue> DictionaryReader<T> {
    /// Pins the current frozen tree.
    #[must_use]
    pub fn snapshot(&self) -> DictionarySnapshot<T> {
        DictionarySnapshot::new(self.frozen.load_full())
    }

    /// Finds `value` through the hash index, or the frozen tree without one.
    #[must_use]
    pub fn find_frozen(&self, value: &T) -> Option<EntryRef> {
        match &self.hash {
            Some(hash) => hash.find(value).map(|dict| dict.entry),
            None => tree_get(&self.frozen.load(), value).map(|dict| dict.entry),
        }
    }

    /// Finds the ref and posting list ref of `value`, through the hash index
    /// or `snapshot`.
    #[must_use]
    pub fn find_posting_list(
        &self,
        value: &T,
        snapshot: &DictionarySnapshot<T>,
    ) -> Option<(EntryRef, EntryRef)> {
        match &self.hash {
            Some(hash) => hash.find(value).map(|dict| (dict.entry, dict.posting)),
            None => snapshot.find_posting_list(value),
        }
    }
}
