//! Collection type aliases for interna.
//!
//! | Type | Use Case |
//! |------|----------|
//! | [`InternaMap`] | Single-threaded hash map |
//! | [`InternaSet`] | Single-threaded hash set |
//! | [`InternaConcurrentMap`] | Multi-threaded hash map |
//!
//! # Example
//!
//! ```rust
//! use interna_common::collections::{interna_map, InternaMap};
//!
//! let mut map: InternaMap<u32, &str> = interna_map();
//! map.insert(7, "seven");
//! assert_eq!(map.get(&7), Some(&"seven"));
//! ```

use rustc_hash::FxBuildHasher;

/// HashMap with FxHash.
pub type InternaMap<K, V> = hashbrown::HashMap<K, V, FxBuildHasher>;

/// HashSet with FxHash.
pub type InternaSet<T> = hashbrown::HashSet<T, FxBuildHasher>;

/// Concurrent HashMap, sharded with fine-grained locks.
///
/// Readers on other threads may query it while the writer updates it.
pub type InternaConcurrentMap<K, V> = dashmap::DashMap<K, V, FxBuildHasher>;

/// Create a new empty [`InternaMap`].
#[inline]
#[must_use]
pub fn interna_map<K, V>() -> InternaMap<K, V> {
    InternaMap::with_hasher(FxBuildHasher)
}

/// Create a new [`InternaMap`] with the specified capacity.
#[inline]
#[must_use]
pub fn interna_map_with_capacity<K, V>(capacity: usize) -> InternaMap<K, V> {
    InternaMap::with_capacity_and_hasher(capacity, FxBuildHasher)
}

/// Create a new empty [`InternaConcurrentMap`].
#[inline]
#[must_use]
pub fn interna_concurrent_map<K, V>() -> InternaConcurrentMap<K, V>
where
    K: Eq + std::hash::Hash,
{
    InternaConcurrentMap::with_hasher(FxBuildHasher)
}
