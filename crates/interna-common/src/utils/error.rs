//! Error types for interna.
//!
//! Recoverable failures surface as [`Error`]. Contract violations (a duplicate
//! dictionary insert, a reference count going negative, running out of
//! buffer ids) panic instead, since they mean the caller broke an invariant.

use std::fmt;

use thiserror::Error;

use crate::types::EntryRef;

/// The main error type.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// The reference is [`EntryRef::INVALID`].
    #[error("invalid entry reference")]
    InvalidRef,

    /// The reference names a buffer that holds no entries.
    #[error("entry {0} refers to a buffer that is not in use")]
    UnknownBuffer(EntryRef),

    /// The reference points past the last entry handed out from its buffer.
    #[error("entry {0} is out of bounds")]
    OutOfBounds(EntryRef),

    /// The entry was reclaimed and its slot no longer holds a value.
    #[error("entry {0} has been freed")]
    FreedEntry(EntryRef),

    /// Fewer owner references were remapped than moved entries claim.
    #[error("compaction remap incomplete: applied {applied} of {expected} expected remaps")]
    IncompleteRemap {
        /// Sum of the reference counts of every moved entry.
        expected: u64,
        /// Number of owner references remapped so far.
        applied: u64,
    },

    /// `finish_compact` was called without a matching `start_compact`.
    #[error("no compaction in progress")]
    CompactionNotStarted,

    /// Bulk loading failed.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Bulk loading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The raw buffer ended in the middle of a value.
    #[error("truncated {type_name} value at byte {offset}")]
    Truncated {
        /// Value type being decoded.
        type_name: &'static str,
        /// Byte offset where the value started.
        offset: usize,
    },

    /// A string value is not valid UTF-8.
    #[error("invalid UTF-8 in string value at byte {offset}")]
    InvalidUtf8 {
        /// Byte offset where the value started.
        offset: usize,
    },

    /// Two loaded values compare equal.
    #[error("duplicate value at load index {index}")]
    DuplicateValue {
        /// Position of the second occurrence in load order.
        index: usize,
    },

    /// A histogram or index slice does not match the number of loaded values.
    #[error("expected {expected} entries, found {actual}")]
    LengthMismatch {
        /// Number of values loaded.
        expected: usize,
        /// Length actually supplied.
        actual: usize,
    },

    /// Loaders only run against an empty store.
    #[error("store must be empty before loading")]
    StoreNotEmpty,
}

/// Errors from configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// `min_entries_per_buffer` must be greater than zero.
    ZeroMinEntries,
    /// `min_entries_per_buffer` exceeds `max_entries_per_buffer`.
    MinExceedsMax {
        /// Configured minimum.
        min: u32,
        /// Configured maximum.
        max: u32,
    },
    /// `max_entries_per_buffer` does not fit the offset field of an [`EntryRef`].
    MaxEntriesTooLarge(u32),
    /// `grow_factor` must be a positive finite number.
    InvalidGrowFactor(f64),
    /// `max_buffers` must be in `1..=EntryRef::NUM_BUFFERS`.
    InvalidMaxBuffers(u32),
    /// Compaction dead ratio must be in `[0, 1]`.
    InvalidDeadRatio(f64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroMinEntries => write!(f, "min_entries_per_buffer must be greater than zero"),
            Self::MinExceedsMax { min, max } => write!(
                f,
                "min_entries_per_buffer ({min}) exceeds max_entries_per_buffer ({max})"
            ),
            Self::MaxEntriesTooLarge(max) => write!(
                f,
                "max_entries_per_buffer ({max}) exceeds the addressable limit of {}",
                EntryRef::MAX_OFFSET
            ),
            Self::InvalidGrowFactor(factor) => {
                write!(f, "grow_factor must be positive and finite, got {factor}")
            }
            Self::InvalidMaxBuffers(count) => write!(
                f,
                "max_buffers must be between 1 and {}, got {count}",
                EntryRef::NUM_BUFFERS
            ),
            Self::InvalidDeadRatio(ratio) => {
                write!(f, "max_dead_ratio must be between 0 and 1, got {ratio}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Result type alias for interna operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::FreedEntry(EntryRef::new(1, 5));
        assert_eq!(err.to_string(), "entry 1:5 has been freed");

        let err = Error::IncompleteRemap {
            expected: 10,
            applied: 7,
        };
        assert_eq!(
            err.to_string(),
            "compaction remap incomplete: applied 7 of 10 expected remaps"
        );
    }

    #[test]
    fn test_load_error_converts() {
        let err: Error = LoadError::DuplicateValue { index: 3 }.into();
        assert!(matches!(err, Error::Load(LoadError::DuplicateValue { index: 3 })));
        assert_eq!(err.to_string(), "duplicate value at load index 3");
    }

    #[test]
    fn test_config_error_display() {
        let err: Error = ConfigError::MinExceedsMax { min: 10, max: 4 }.into();
        assert_eq!(
            err.to_string(),
            "min_entries_per_buffer (10) exceeds max_entries_per_buffer (4)"
        );
    }
}
