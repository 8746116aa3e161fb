//! The enum store: deduplicated, reference-counted values in an arena with
//! an ordered dictionary on top.
//!
//! [`EnumStore`] is the single writer. It hands out one [`EntryRef`] per
//! distinct value and keeps a per-value reference count. Readers on other
//! threads use an [`EnumStoreReader`] and see the dictionary as of the last
//! freeze.
//!
//! # Commit cycle
//!
//! Removed values are not dropped on the spot. They wait on hold lists until
//! no reader can still observe them:
//!
//! ```text
//! freeze_dictionary()         publish the dictionary to readers
//! transfer_hold_lists(g)      tag pending holds with the current generation
//! increment_generation()      new readers start at g + 1
//! trim_hold_lists(oldest)     drop holds older than every live reader
//! ```
//!
//! [`EnumStore::commit`] runs all four steps.
//!
//! # Example
//!
//! ```
//! use interna_core::{DictionaryType, EnumStore};
//!
//! let mut store = EnumStore::<String>::with_dictionary_type(DictionaryType::BTree).unwrap();
//! let apple = store.insert("apple".to_string());
//! assert_eq!(store.insert("apple".to_string()), apple);
//! assert_eq!(store.get_ref_count(apple).unwrap(), 2);
//!
//! store.commit();
//! let view = store.reader().read();
//! assert_eq!(view.find_frozen_index(&"apple".to_string()), Some(apple));
//! ```
//!
//! [`EntryRef`]: interna_common::EntryRef

mod batch;
mod enumerator;
mod loaders;
mod reader;
mod store;
mod value;

pub use batch::BatchUpdater;
pub use enumerator::Enumerator;
pub use loaders::{EnumeratedLoader, EnumeratedPostingsLoader, NonEnumeratedLoader};
pub use reader::{EnumStoreReader, ReadView};
pub use store::EnumStore;
pub use value::{EnumValue, encode_values};
