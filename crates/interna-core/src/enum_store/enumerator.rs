//! Dense numbering of stored values for save passes.

use interna_common::EntryRef;
use interna_common::collections::{InternaMap, interna_map_with_capacity};

use super::value::EnumValue;
use crate::dictionary::DictionarySnapshot;

/// Maps each ref of a frozen dictionary to its 1-based position in value
/// order.
///
/// The enumerator keeps its snapshot pinned, so the numbering stays stable
/// while the writer keeps going.
#[derive(Debug)]
pub struct Enumerator<T> {
    snapshot: DictionarySnapshot<T>,
    enum_values: InternaMap<EntryRef, u32>,
}

impl<T: EnumValue> Enumerator<T> {
    pub(super) fn new(snapshot: DictionarySnapshot<T>) -> Self {
        let mut enum_values = interna_map_with_capacity(snapshot.len());
        let mut next = 0_u32;
        snapshot.for_each_key(|entry| {
            next += 1;
            enum_values.insert(entry, next);
        });
        Self {
            snapshot,
            enum_values,
        }
    }

    /// Returns the enum value of `entry`, or 0 if it is not in the snapshot.
    #[must_use]
    pub fn map_entry_ref_to_enum_value(&self, entry: EntryRef) -> u32 {
        self.enum_values.get(&entry).copied().unwrap_or(0)
    }

    /// Returns the numbered dictionary.
    #[must_use]
    pub fn snapshot(&self) -> &DictionarySnapshot<T> {
        &self.snapshot
    }

    /// Returns the number of numbered values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.enum_values.len()
    }

    /// Returns `true` if nothing was numbered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.enum_values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::DictionaryType;
    use crate::enum_store::EnumStore;
    use interna_common::EntryRef;

    #[test]
    fn test_enum_values_follow_value_order() {
        let mut store = EnumStore::<String>::with_dictionary_type(DictionaryType::BTree).unwrap();
        let b = store.insert("b".to_string());
        let a = store.insert("a".to_string());
        let c = store.insert("C".to_string());
        store.commit();
        let late = store.insert("d".to_string());

        let enumerator = store.make_enumerator();
        assert_eq!(enumerator.len(), 3);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(a), 1);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(b), 2);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(c), 3);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(late), 0);
        assert_eq!(enumerator.map_entry_ref_to_enum_value(EntryRef::INVALID), 0);
    }
}
