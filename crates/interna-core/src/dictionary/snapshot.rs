//! Pinned views of the frozen dictionary.

use std::fmt;
use std::sync::Arc;

use interna_common::EntryRef;

use super::key::{DictEntry, Tree, tree_get, tree_matching_folded};
use crate::enum_store::EnumValue;

/// An immutable dictionary tree as of some `freeze`.
///
/// Holding a snapshot keeps that tree alive. It is unaffected by anything
/// the writer does afterwards, including later freezes.
pub struct DictionarySnapshot<T> {
    tree: Arc<Tree<T>>,
}

impl<T> Clone for DictionarySnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            tree: Arc::clone(&self.tree),
        }
    }
}

impl<T: EnumValue> DictionarySnapshot<T> {
    pub(crate) fn new(tree: Arc<Tree<T>>) -> Self {
        Self { tree }
    }

    /// Returns the ref stored for `value`.
    #[must_use]
    pub fn find(&self, value: &T) -> Option<EntryRef> {
        tree_get(&self.tree, value).map(|dict| dict.entry)
    }

    /// Returns the full entry stored for `value`.
    #[must_use]
    pub fn find_entry(&self, value: &T) -> Option<DictEntry> {
        tree_get(&self.tree, value).copied()
    }

    /// Returns the ref and posting list ref stored for `value`.
    #[must_use]
    pub fn find_posting_list(&self, value: &T) -> Option<(EntryRef, EntryRef)> {
        tree_get(&self.tree, value).map(|dict| (dict.entry, dict.posting))
    }

    /// Returns every key folded-equal to `value`, in key order.
    #[must_use]
    pub fn find_matching_folded(&self, value: &T) -> Vec<EntryRef> {
        tree_matching_folded(&self.tree, value)
    }

    /// Calls `f` with every ref in ascending key order.
    pub fn for_each_key(&self, mut f: impl FnMut(EntryRef)) {
        for dict in self.tree.values() {
            f(dict.entry);
        }
    }

    /// Iterates over values and their entries in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, DictEntry)> {
        self.tree.iter().map(|(key, dict)| (key.value(), *dict))
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if the snapshot holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl<T> fmt::Debug for DictionarySnapshot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionarySnapshot")
            .field("len", &self.tree.len())
            .finish()
    }
}
