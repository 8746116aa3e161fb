//! Store configuration.
//!
//! Defaults suit production-sized stores. Tests usually shrink
//! `min_entries_per_buffer` and `max_entries_per_buffer` so buffer switches
//! and compaction happen after a handful of inserts.

use std::fmt;

use interna_common::EntryRef;
use interna_common::utils::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Which dictionary structure backs the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DictionaryType {
    /// Ordered tree only.
    #[default]
    BTree,
    /// Ordered tree plus a concurrent hash index for fast frozen lookups.
    BTreeAndHash,
}

impl DictionaryType {
    /// Returns `true` if this variant maintains a hash index.
    #[must_use]
    pub const fn has_hash(self) -> bool {
        matches!(self, Self::BTreeAndHash)
    }
}

impl fmt::Display for DictionaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BTree => write!(f, "btree"),
            Self::BTreeAndHash => write!(f, "btree_and_hash"),
        }
    }
}

/// Arena sizing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataStoreConfig {
    /// Smallest capacity of a newly activated buffer.
    pub min_entries_per_buffer: u32,
    /// Largest capacity of a buffer. At most [`EntryRef::MAX_OFFSET`].
    pub max_entries_per_buffer: u32,
    /// New buffer capacity is `live_entries * grow_factor`, clamped to the bounds above.
    pub grow_factor: f64,
    /// Number of buffer ids the arena may use.
    pub max_buffers: u32,
    /// Reuse freed slots before appending to the primary buffer.
    pub enable_free_lists: bool,
}

impl Default for DataStoreConfig {
    fn default() -> Self {
        Self {
            min_entries_per_buffer: 1024,
            max_entries_per_buffer: EntryRef::MAX_OFFSET,
            grow_factor: 1.0,
            max_buffers: EntryRef::NUM_BUFFERS,
            enable_free_lists: true,
        }
    }
}

impl DataStoreConfig {
    /// Sets the capacity bounds of new buffers.
    #[must_use]
    pub fn with_entries_per_buffer(mut self, min: u32, max: u32) -> Self {
        self.min_entries_per_buffer = min;
        self.max_entries_per_buffer = max;
        self
    }

    /// Sets the buffer growth factor.
    #[must_use]
    pub fn with_grow_factor(mut self, factor: f64) -> Self {
        self.grow_factor = factor;
        self
    }

    /// Limits the number of buffer ids.
    #[must_use]
    pub fn with_max_buffers(mut self, count: u32) -> Self {
        self.max_buffers = count;
        self
    }

    /// Disables free-list reuse, so freed slots stay dead until compaction.
    #[must_use]
    pub fn without_free_lists(mut self) -> Self {
        self.enable_free_lists = false;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first rule the configuration violates.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.min_entries_per_buffer == 0 {
            return Err(ConfigError::ZeroMinEntries);
        }
        if self.max_entries_per_buffer > EntryRef::MAX_OFFSET {
            return Err(ConfigError::MaxEntriesTooLarge(self.max_entries_per_buffer));
        }
        if self.min_entries_per_buffer > self.max_entries_per_buffer {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_entries_per_buffer,
                max: self.max_entries_per_buffer,
            });
        }
        if !(self.grow_factor.is_finite() && self.grow_factor > 0.0) {
            return Err(ConfigError::InvalidGrowFactor(self.grow_factor));
        }
        if self.max_buffers == 0 || self.max_buffers > EntryRef::NUM_BUFFERS {
            return Err(ConfigError::InvalidMaxBuffers(self.max_buffers));
        }
        Ok(())
    }
}

/// Which buffers `start_compact` picks.
///
/// A buffer qualifies when its wasted share `(dead + held) / used` is at
/// least `max_dead_ratio` and it wastes at least `min_dead_entries` slots.
/// The worst qualifying buffers are compacted first, up to `max_buffers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactionStrategy {
    /// Wasted share at or above which a buffer is compacted.
    pub max_dead_ratio: f64,
    /// Minimum number of wasted slots.
    pub min_dead_entries: u32,
    /// Maximum number of buffers compacted in one round.
    pub max_buffers: usize,
}

impl Default for CompactionStrategy {
    fn default() -> Self {
        Self {
            max_dead_ratio: 0.5,
            min_dead_entries: 1,
            max_buffers: 1,
        }
    }
}

impl CompactionStrategy {
    /// Compacts every buffer with at least one wasted slot.
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            max_dead_ratio: 0.0,
            min_dead_entries: 1,
            max_buffers: usize::MAX,
        }
    }

    /// Sets the wasted share threshold.
    #[must_use]
    pub fn with_max_dead_ratio(mut self, ratio: f64) -> Self {
        self.max_dead_ratio = ratio;
        self
    }

    /// Sets the minimum wasted slot count.
    #[must_use]
    pub fn with_min_dead_entries(mut self, count: u32) -> Self {
        self.min_dead_entries = count;
        self
    }

    /// Sets the number of buffers compacted per round.
    #[must_use]
    pub fn with_max_buffers(mut self, count: usize) -> Self {
        self.max_buffers = count;
        self
    }

    /// Validates the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidDeadRatio`] if the ratio is outside `[0, 1]`.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.max_dead_ratio) {
            return Err(ConfigError::InvalidDeadRatio(self.max_dead_ratio));
        }
        Ok(())
    }
}

/// Enum store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumStoreConfig {
    /// Dictionary variant.
    pub dictionary_type: DictionaryType,
    /// Arena sizing.
    pub data_store: DataStoreConfig,
    /// Check at `finish_compact` that owners applied every expected remap.
    ///
    /// On by default in debug builds.
    pub verify_compaction_remap: bool,
}

impl Default for EnumStoreConfig {
    fn default() -> Self {
        Self {
            dictionary_type: DictionaryType::default(),
            data_store: DataStoreConfig::default(),
            verify_compaction_remap: cfg!(debug_assertions),
        }
    }
}

impl EnumStoreConfig {
    /// Sets the dictionary variant.
    #[must_use]
    pub fn with_dictionary_type(mut self, dictionary_type: DictionaryType) -> Self {
        self.dictionary_type = dictionary_type;
        self
    }

    /// Sets the arena configuration.
    #[must_use]
    pub fn with_data_store(mut self, data_store: DataStoreConfig) -> Self {
        self.data_store = data_store;
        self
    }

    /// Turns the remap cross-check at `finish_compact` on or off.
    #[must_use]
    pub fn with_compaction_remap_check(mut self, enabled: bool) -> Self {
        self.verify_compaction_remap = enabled;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first rule the arena configuration violates.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        self.data_store.validate()
    }
}
