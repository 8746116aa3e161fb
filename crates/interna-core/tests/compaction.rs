//! Integration tests for compaction and ref remapping.

use interna_common::{EntryRef, Error};
use interna_core::{
    CompactionStrategy, DataStoreConfig, DictionaryType, EnumStore, EnumStoreConfig,
};

const TYPES: [DictionaryType; 2] = [DictionaryType::BTree, DictionaryType::BTreeAndHash];

fn small_store(dictionary_type: DictionaryType, verify: bool) -> EnumStore<i64> {
    let config = EnumStoreConfig::default()
        .with_dictionary_type(dictionary_type)
        .with_data_store(DataStoreConfig::default().with_entries_per_buffer(8, 8))
        .with_compaction_remap_check(verify);
    EnumStore::new(config).unwrap()
}

/// Fills two buffers and frees most of the first one.
fn fragmented(dictionary_type: DictionaryType, verify: bool) -> (EnumStore<i64>, Vec<EntryRef>) {
    let mut store = small_store(dictionary_type, verify);
    let refs: Vec<EntryRef> = (0..12).map(|v| store.insert(v)).collect();
    assert_eq!(refs[0].buffer_id(), 0);
    assert_eq!(refs[11].buffer_id(), 1);

    let mut batch = store.make_batch_updater();
    for &entry in &refs[..5] {
        batch.dec_ref_count(entry).unwrap();
    }
    batch.commit();
    store.commit();
    let owners = refs[5..].to_vec();
    (store, owners)
}

#[test]
fn compaction_moves_live_values() {
    for dictionary_type in TYPES {
        let (mut store, mut owners) = fragmented(dictionary_type, true);
        let before: Vec<i64> = owners.iter().map(|&e| store.get_value(e).unwrap()).collect();

        let remapper = store
            .start_compact(&CompactionStrategy::default())
            .unwrap()
            .unwrap();
        assert_eq!(remapper.compacted_buffers(), &[0]);
        assert_eq!(remapper.moved_entries(), 2);
        assert!(store.is_compacting());

        remapper.remap_all(&mut owners);
        assert_eq!(remapper.applied_remaps(), remapper.expected_remaps());
        let stats = store.finish_compact(&remapper).unwrap();
        assert_eq!(stats.buffers_compacted, 1);
        assert_eq!(stats.entries_moved, 2);
        assert!(!store.is_compacting());

        assert!(owners.iter().all(|entry| entry.buffer_id() != 0));
        let after: Vec<i64> = owners.iter().map(|&e| store.get_value(e).unwrap()).collect();
        assert_eq!(before, after);
        for (value, &entry) in after.iter().zip(&owners) {
            assert_eq!(store.find_index(value), Some(entry));
            assert_eq!(store.find_frozen_index(value), Some(entry));
        }
    }
}

#[test]
fn compacted_buffer_is_freed_after_readers_leave() {
    let (mut store, mut owners) = fragmented(DictionaryType::BTree, true);
    let old = owners[0];
    let view = store.reader().read();

    let remapper = store
        .start_compact(&CompactionStrategy::default())
        .unwrap()
        .unwrap();
    remapper.remap_all(&mut owners);
    store.finish_compact(&remapper).unwrap();
    store.commit();

    assert_eq!(view.get_value(old).unwrap(), 5);
    assert_eq!(view.snapshot().find(&5), Some(old));
    assert_eq!(store.memory_usage().held_buffers, 1);

    drop(view);
    store.commit();
    assert_eq!(store.memory_usage().held_buffers, 0);
    assert!(store.get_value(old).is_err());
    assert_eq!(store.get_value(owners[0]).unwrap(), 5);
}

#[test]
fn missing_remaps_are_reported() {
    let (mut store, owners) = fragmented(DictionaryType::BTree, true);
    let remapper = store
        .start_compact(&CompactionStrategy::default())
        .unwrap()
        .unwrap();
    let err = store.finish_compact(&remapper).unwrap_err();
    assert_eq!(
        err,
        Error::IncompleteRemap {
            expected: 2,
            applied: 0
        }
    );
    assert!(store.is_compacting());

    // A second start is refused while one is open.
    assert!(
        store
            .start_compact(&CompactionStrategy::aggressive())
            .unwrap()
            .is_none()
    );

    let mut owners = owners;
    remapper.remap_all(&mut owners);
    assert!(store.finish_compact(&remapper).is_ok());
}

#[test]
fn remap_check_can_be_disabled() {
    let (mut store, _owners) = fragmented(DictionaryType::BTreeAndHash, false);
    let remapper = store
        .start_compact(&CompactionStrategy::default())
        .unwrap()
        .unwrap();
    let stats = store.finish_compact(&remapper).unwrap();
    assert_eq!(stats.remaps_applied, 0);
}

#[test]
fn unaffected_refs_pass_through() {
    let (mut store, owners) = fragmented(DictionaryType::BTree, false);
    let remapper = store
        .start_compact(&CompactionStrategy::default())
        .unwrap()
        .unwrap();
    let untouched = *owners.last().unwrap();
    assert_eq!(remapper.remap(untouched), untouched);
    assert_eq!(remapper.remap(EntryRef::INVALID), EntryRef::INVALID);
    assert!(!remapper.is_compacted(untouched));
    assert!(remapper.is_compacted(owners[0]));
    assert_eq!(remapper.applied_remaps(), 0);
}

#[test]
fn healthy_buffers_are_left_alone() {
    let mut store = small_store(DictionaryType::BTree, true);
    for v in 0..6 {
        store.insert(v);
    }
    assert!(
        store
            .start_compact(&CompactionStrategy::default())
            .unwrap()
            .is_none()
    );
    assert!(!store.is_compacting());
    assert_eq!(store.memory_usage().held_buffers, 0);
}

#[test]
fn large_owner_arrays_remap_in_parallel() {
    let (mut store, owners) = fragmented(DictionaryType::BTree, true);
    let remapper = store
        .start_compact(&CompactionStrategy::default())
        .unwrap()
        .unwrap();
    let mut many: Vec<EntryRef> = owners.iter().copied().cycle().take(50_000).collect();
    remapper.remap_all(&mut many);
    assert!(many.iter().all(|entry| entry.buffer_id() != 0));
    assert!(store.finish_compact(&remapper).is_ok());
}
