//! Staged reference count changes.

use std::collections::BTreeMap;
use std::sync::Arc;

use interna_common::collections::{InternaMap, interna_map};
use interna_common::{EntryRef, Result};
use tracing::{debug, warn};

use super::store::EnumStore;
use super::value::EnumValue;
use crate::dictionary::{DictKey, Probe};

/// A batch of inserts and reference count changes against an [`EnumStore`].
///
/// New values get an arena slot right away but stay out of the dictionary
/// until [`commit`](Self::commit). At commit, new values that ended up
/// referenced are added, and values whose count dropped to 0 are removed and
/// held until readers are done with them.
///
/// Dropping the updater without committing discards the staged counts and
/// holds the slots of the new values.
pub struct BatchUpdater<'a, T: EnumValue> {
    store: &'a mut EnumStore<T>,
    fresh: BTreeMap<DictKey<T>, EntryRef>,
    counts: InternaMap<EntryRef, u32>,
}

impl<'a, T: EnumValue> BatchUpdater<'a, T> {
    pub(super) fn new(store: &'a mut EnumStore<T>) -> Self {
        Self {
            store,
            fresh: BTreeMap::new(),
            counts: interna_map(),
        }
    }

    /// Returns the ref of `value`, staging it if it is not stored yet.
    ///
    /// Does not change any reference count.
    pub fn insert(&mut self, value: T) -> EntryRef {
        if let Some(entry) = self.store.dict.find(&value) {
            return entry;
        }
        if let Some(&entry) = self.fresh.get(Probe::Exact(&value).as_dyn()) {
            return entry;
        }
        let value = Arc::new(value);
        let entry = self.store.store.allocate(Arc::clone(&value));
        self.fresh.insert(DictKey(value), entry);
        self.counts.insert(entry, 0);
        entry
    }

    /// Returns the reference count `entry` will have after commit.
    ///
    /// # Errors
    ///
    /// Fails if the ref does not resolve to a stored value.
    pub fn ref_count(&self, entry: EntryRef) -> Result<u32> {
        match self.counts.get(&entry) {
            Some(&count) => Ok(count),
            None => self.store.store.ref_count(entry),
        }
    }

    /// Stages one more reference to `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the ref does not resolve to a stored value.
    pub fn inc_ref_count(&mut self, entry: EntryRef) -> Result<()> {
        let count = self.ref_count(entry)?;
        self.counts.insert(entry, count + 1);
        Ok(())
    }

    /// Stages one reference less to `entry`.
    ///
    /// # Errors
    ///
    /// Fails if the ref does not resolve to a stored value.
    ///
    /// # Panics
    ///
    /// Panics if the staged count is already 0.
    pub fn dec_ref_count(&mut self, entry: EntryRef) -> Result<()> {
        let current = self.ref_count(entry)?;
        let Some(count) = current.checked_sub(1) else {
            panic!("reference count of {entry} would go negative");
        };
        self.counts.insert(entry, count);
        Ok(())
    }

    /// Applies the staged changes.
    pub fn commit(mut self) {
        let counts = std::mem::take(&mut self.counts);
        let fresh = std::mem::take(&mut self.fresh);
        let store = &mut *self.store;

        for (&entry, &count) in &counts {
            if let Err(err) = store.store.set_ref_count(entry, count) {
                warn!(%entry, %err, "staged ref no longer resolves");
            }
        }

        let mut added = 0_usize;
        for (key, entry) in fresh {
            if counts.get(&entry).copied().unwrap_or(0) > 0 {
                store.dict.insert(key.0, entry);
                added += 1;
            } else {
                store.store.hold_entry(entry);
            }
        }

        let mut removed = 0_usize;
        for (&entry, &count) in &counts {
            if count == 0 && store.remove_if_unused(entry) {
                removed += 1;
            }
        }
        debug!(changed = counts.len(), added, removed, "committed batch");
    }
}

impl<T: EnumValue> Drop for BatchUpdater<'_, T> {
    fn drop(&mut self) {
        if self.fresh.is_empty() && self.counts.is_empty() {
            return;
        }
        let fresh = std::mem::take(&mut self.fresh);
        for entry in fresh.values() {
            self.store.store.hold_entry(*entry);
        }
        debug!(
            fresh = fresh.len(),
            changed = self.counts.len(),
            "discarded uncommitted batch"
        );
    }
}
