//! Dictionary keys and borrowed lookup probes.
//!
//! Tree keys share the stored `Arc<T>` with the arena. Lookups should not
//! have to allocate one, so the tree is also searchable through
//! `dyn KeyProbe<T>`: a key and a borrowed probe compare through the same
//! function, which keeps `Borrow` consistent with `Ord`.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Bound;
use std::sync::Arc;

use interna_common::EntryRef;
use serde::{Deserialize, Serialize};

use crate::enum_store::EnumValue;

/// The data stored per dictionary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct DictEntry {
    /// Arena ref of the value.
    pub entry: EntryRef,
    /// Opaque posting list ref, [`EntryRef::INVALID`] when unset.
    pub posting: EntryRef,
}

impl DictEntry {
    /// Creates an entry with no posting list.
    #[must_use]
    pub const fn new(entry: EntryRef) -> Self {
        Self {
            entry,
            posting: EntryRef::INVALID,
        }
    }

    /// Creates an entry with a posting list.
    #[must_use]
    pub const fn with_posting(entry: EntryRef, posting: EntryRef) -> Self {
        Self { entry, posting }
    }
}

pub(crate) type Tree<T> = BTreeMap<DictKey<T>, DictEntry>;

/// A stored value used as a tree key.
pub(crate) struct DictKey<T>(pub(crate) Arc<T>);

impl<T> DictKey<T> {
    pub(crate) fn value(&self) -> &T {
        &self.0
    }
}

impl<T> Clone for DictKey<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: fmt::Debug> fmt::Debug for DictKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: EnumValue> PartialEq for DictKey<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.compare(&other.0) == Ordering::Equal
    }
}

impl<T: EnumValue> Eq for DictKey<T> {}

impl<T: EnumValue> PartialOrd for DictKey<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: EnumValue> Ord for DictKey<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.compare(&other.0)
    }
}

/// A borrowed position in the key order.
pub(crate) enum Probe<'a, T> {
    /// The position of this exact value.
    Exact(&'a T),
    /// Just before the first key that is folded-equal to this value.
    FoldedLowerBound(&'a T),
}

impl<T> Clone for Probe<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Probe<'_, T> {}

impl<'a, T: EnumValue> Probe<'a, T> {
    pub(crate) fn as_dyn(&self) -> &(dyn KeyProbe<T> + '_) {
        self
    }
}

pub(crate) trait KeyProbe<T> {
    fn probe(&self) -> Probe<'_, T>;
}

impl<T: EnumValue> KeyProbe<T> for DictKey<T> {
    fn probe(&self) -> Probe<'_, T> {
        Probe::Exact(&self.0)
    }
}

impl<T: EnumValue> KeyProbe<T> for Probe<'_, T> {
    fn probe(&self) -> Probe<'_, T> {
        *self
    }
}

fn cmp_probes<T: EnumValue>(lhs: Probe<'_, T>, rhs: Probe<'_, T>) -> Ordering {
    match (lhs, rhs) {
        (Probe::Exact(a), Probe::Exact(b)) => a.compare(b),
        (Probe::FoldedLowerBound(a), Probe::Exact(b)) => a.compare_folded(b).then(Ordering::Less),
        (Probe::Exact(a), Probe::FoldedLowerBound(b)) => {
            a.compare_folded(b).then(Ordering::Greater)
        }
        (Probe::FoldedLowerBound(a), Probe::FoldedLowerBound(b)) => a.compare_folded(b),
    }
}

impl<T: EnumValue> PartialEq for dyn KeyProbe<T> + '_ {
    fn eq(&self, other: &Self) -> bool {
        cmp_probes(self.probe(), other.probe()) == Ordering::Equal
    }
}

impl<T: EnumValue> Eq for dyn KeyProbe<T> + '_ {}

impl<T: EnumValue> PartialOrd for dyn KeyProbe<T> + '_ {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: EnumValue> Ord for dyn KeyProbe<T> + '_ {
    fn cmp(&self, other: &Self) -> Ordering {
        cmp_probes(self.probe(), other.probe())
    }
}

impl<'a, T: EnumValue> Borrow<dyn KeyProbe<T> + 'a> for DictKey<T> {
    fn borrow(&self) -> &(dyn KeyProbe<T> + 'a) {
        self
    }
}

/// Looks up the entry stored for a value.
pub(crate) fn tree_get<'t, T: EnumValue>(tree: &'t Tree<T>, value: &T) -> Option<&'t DictEntry> {
    tree.get(Probe::Exact(value).as_dyn())
}

/// Returns the refs of every key folded-equal to `value`, in key order.
pub(crate) fn tree_matching_folded<T: EnumValue>(tree: &Tree<T>, value: &T) -> Vec<EntryRef> {
    let lower = Probe::FoldedLowerBound(value);
    tree.range::<dyn KeyProbe<T> + '_, _>((Bound::Included(lower.as_dyn()), Bound::Unbounded))
        .take_while(|(key, _)| key.value().compare_folded(value) == Ordering::Equal)
        .map(|(_, dict)| dict.entry)
        .collect()
}
