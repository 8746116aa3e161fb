//! # interna-core
//!
//! Core layer for interna: the arena, the value dictionary and the enum store
//! built on top of them.
//!
//! An enum store keeps one copy of each distinct value and hands out a
//! compact [`EntryRef`] for it. A single writer inserts values and adjusts
//! reference counts. Any number of readers look values up concurrently and
//! never block the writer. Memory of removed values is reclaimed only after
//! every reader that could still see them is gone.
//!
//! ## Modules
//!
//! - [`config`] - Store, arena and compaction settings
//! - [`datastore`] - Buffered arena, hold lists, compaction and remapping
//! - [`dictionary`] - Ordered value dictionary with optional hash index
//! - [`enum_store`] - The store façade, batch updates, loaders and readers
//!
//! [`EntryRef`]: interna_common::EntryRef

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod datastore;
pub mod dictionary;
pub mod enum_store;

// Re-export commonly used types
pub use config::{CompactionStrategy, DataStoreConfig, DictionaryType, EnumStoreConfig};
pub use datastore::{CompactionStats, EntryRefRemapper};
pub use dictionary::{DictEntry, DictionarySnapshot};
pub use enum_store::{BatchUpdater, EnumStore, EnumStoreReader, EnumValue, ReadView, encode_values};
