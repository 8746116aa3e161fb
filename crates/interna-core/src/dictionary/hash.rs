//! Concurrent hash index kept next to the tree.
//!
//! Buckets are keyed by the 64-bit content hash. Collisions are resolved by
//! comparing the stored values, so a bucket holds one entry in all but
//! pathological cases.

use std::sync::Arc;

use interna_common::collections::{InternaConcurrentMap, interna_concurrent_map};
use smallvec::SmallVec;

use super::key::DictEntry;
use crate::enum_store::EnumValue;

struct HashEntry<T> {
    value: Arc<T>,
    dict: DictEntry,
}

type Bucket<T> = SmallVec<[HashEntry<T>; 1]>;

/// Value-to-entry index that readers may query while the writer updates it.
pub(crate) struct HashIndex<T> {
    map: InternaConcurrentMap<u64, Bucket<T>>,
}

impl<T: EnumValue> HashIndex<T> {
    pub(crate) fn new() -> Self {
        Self {
            map: interna_concurrent_map(),
        }
    }

    pub(crate) fn find(&self, value: &T) -> Option<DictEntry> {
        let bucket = self.map.get(&value.content_hash())?;
        bucket
            .iter()
            .find(|e| e.value.content_eq(value))
            .map(|e| e.dict)
    }

    pub(crate) fn insert(&self, value: Arc<T>, dict: DictEntry) {
        let hash = value.content_hash();
        let mut bucket = self.map.entry(hash).or_default();
        debug_assert!(
            !bucket.iter().any(|e| e.value.content_eq(&value)),
            "duplicate hash index key {value:?}"
        );
        bucket.push(HashEntry { value, dict });
    }

    pub(crate) fn remove(&self, value: &T) -> Option<DictEntry> {
        let hash = value.content_hash();
        let removed = {
            let mut bucket = self.map.get_mut(&hash)?;
            let pos = bucket.iter().position(|e| e.value.content_eq(value))?;
            bucket.swap_remove(pos).dict
        };
        self.map.remove_if(&hash, |_, bucket| bucket.is_empty());
        Some(removed)
    }

    /// Applies `f` to the entry stored for `value`. Returns `false` if absent.
    pub(crate) fn update(&self, value: &T, f: impl FnOnce(&mut DictEntry)) -> bool {
        let Some(mut bucket) = self.map.get_mut(&value.content_hash()) else {
            return false;
        };
        match bucket.iter_mut().find(|e| e.value.content_eq(value)) {
            Some(entry) => {
                f(&mut entry.dict);
                true
            }
            None => false,
        }
    }

    /// Applies `f` to every entry.
    pub(crate) fn for_each_mut(&self, mut f: impl FnMut(&mut DictEntry)) {
        for mut bucket in self.map.iter_mut() {
            for entry in bucket.iter_mut() {
                f(&mut entry.dict);
            }
        }
    }
}
