//! Integration tests for readers running alongside the writer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use interna_common::EntryRef;
use interna_core::{
    CompactionStrategy, DataStoreConfig, DictionaryType, EnumStore, EnumStoreConfig, ReadView,
};

const TYPES: [DictionaryType; 2] = [DictionaryType::BTree, DictionaryType::BTreeAndHash];

fn small_store(dictionary_type: DictionaryType) -> EnumStore<String> {
    let config = EnumStoreConfig::default()
        .with_dictionary_type(dictionary_type)
        .with_data_store(DataStoreConfig::default().with_entries_per_buffer(32, 64));
    EnumStore::new(config).unwrap()
}

struct Reader {
    view: ReadView<String>,
    refs: Vec<EntryRef>,
    expected: Vec<String>,
}

impl Reader {
    fn check(&self) {
        for (entry, expected) in self.refs.iter().zip(&self.expected) {
            assert_eq!(&self.view.get_value(*entry).unwrap(), expected);
        }
    }
}

#[test]
fn hold_lists_and_generation() {
    let mut store = small_store(DictionaryType::BTree);
    let uniques: Vec<String> = (0..100).map(|i| format!("enum{i:02}")).collect();
    let mut readers = Vec::new();

    for (i, value) in uniques.iter().enumerate() {
        let entry = store.insert(value.clone());
        assert_eq!(store.get_ref_count(entry).unwrap(), 1);
        if i % 10 == 9 {
            store.commit();
            let view = store.reader().read();
            let group = &uniques[i - 9..=i];
            let refs = group
                .iter()
                .map(|v| view.find_frozen_index(v).unwrap())
                .collect();
            readers.push(Reader {
                view,
                refs,
                expected: group.to_vec(),
            });
            readers.iter().for_each(Reader::check);
        }
    }

    let refs: Vec<EntryRef> = uniques
        .iter()
        .map(|v| store.find_index(v).unwrap())
        .collect();
    let mut batch = store.make_batch_updater();
    for &entry in &refs {
        batch.dec_ref_count(entry).unwrap();
        assert_eq!(batch.ref_count(entry).unwrap(), 0);
    }
    batch.commit();
    assert_eq!(store.num_uniques(), 0);

    // Guards keep every removed value readable.
    store.commit();
    store.commit();
    readers.iter().for_each(Reader::check);

    drop(readers);
    store.commit();
    for entry in refs {
        assert!(store.get_value(entry).is_err());
    }
}

#[test]
fn pinned_snapshot_survives_later_commits() {
    for dictionary_type in TYPES {
        let mut store = small_store(dictionary_type);
        let keep = store.insert("keep".to_string());
        let removed = store.insert("drop".to_string());
        store.commit();

        let view = store.reader().read();
        let mut batch = store.make_batch_updater();
        batch.dec_ref_count(removed).unwrap();
        batch.commit();
        store.insert("new".to_string());
        store.commit();
        store.commit();

        assert_eq!(view.snapshot().len(), 2);
        assert_eq!(view.snapshot().find(&"drop".to_string()), Some(removed));
        assert_eq!(view.get_value(removed).unwrap(), "drop");
        assert_eq!(view.get_value(keep).unwrap(), "keep");
        assert_eq!(view.snapshot().find(&"new".to_string()), None);

        // Lookups through the view agree with its snapshot on every dictionary type.
        let dropped = "drop".to_string();
        let added = "new".to_string();
        assert_eq!(view.find_frozen_index(&dropped), Some(removed));
        assert_eq!(view.find_frozen_index(&added), None);
        assert_eq!(
            view.find_posting_list(&dropped),
            Some((removed, EntryRef::INVALID))
        );
        assert_eq!(view.find_posting_list(&added), None);
        assert_eq!(store.find_frozen_index(&dropped), None);
        assert!(store.find_frozen_index(&added).is_some());

        let fresh = store.reader().read();
        assert_eq!(fresh.find_frozen_index(&dropped), None);
        assert!(fresh.find_frozen_index(&added).is_some());
        assert!(fresh.generation() > view.generation());
        drop(fresh);
        drop(view);
        store.commit();
        assert!(store.get_value(removed).is_err());
    }
}

#[test]
fn readers_never_observe_freed_values() {
    for dictionary_type in TYPES {
        let mut store = small_store(dictionary_type);
        let reader = store.reader();
        let stop = AtomicBool::new(false);

        thread::scope(|scope| {
            for _ in 0..4 {
                let reader = reader.clone();
                let stop = &stop;
                scope.spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let view = reader.read();
                        for (value, dict) in view.snapshot().iter() {
                            assert_eq!(&view.get_value(dict.entry).unwrap(), value);
                            assert_eq!(view.find_frozen_index(value), Some(dict.entry));
                        }
                    }
                });
            }

            // One owner ref per reference held.
            let mut owners: Vec<EntryRef> = Vec::new();
            for round in 0..200_u32 {
                for i in 0..16 {
                    owners.push(store.insert(format!("value-{round}-{i}")));
                }
                if owners.len() > 64 {
                    let mut batch = store.make_batch_updater();
                    for entry in owners.drain(..32) {
                        batch.dec_ref_count(entry).unwrap();
                    }
                    batch.commit();
                }
                if round % 25 == 24
                    && let Some(remapper) =
                        store.start_compact(&CompactionStrategy::aggressive()).unwrap()
                {
                    remapper.remap_all(&mut owners);
                    store.finish_compact(&remapper).unwrap();
                }
                store.commit();
            }
            stop.store(true, Ordering::Release);
        });

        for value in store.dictionary().iter().map(|(v, _)| v.clone()).collect::<Vec<_>>() {
            let entry = store.find_index(&value).unwrap();
            assert_eq!(store.get_value(entry).unwrap(), value);
        }
    }
}
