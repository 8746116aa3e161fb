//! Content hashing.
//!
//! Dictionary hashes only need to be fast and well spread across a single
//! process, so FxHash is used throughout.

use std::hash::{Hash, Hasher};

pub use rustc_hash::FxHasher;

/// Hashes a value with [`FxHasher`].
#[inline]
#[must_use]
pub fn fx_hash<H: Hash + ?Sized>(value: &H) -> u64 {
    let mut hasher = FxHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_is_deterministic() {
        assert_eq!(fx_hash("interna"), fx_hash("interna"));
        assert_ne!(fx_hash(&1_u64), fx_hash(&2_u64));
    }
}
