//! Utilities shared across interna.
//!
//! - [`error`] - [`Error`], [`LoadError`](error::LoadError) and [`ConfigError`](error::ConfigError)
//! - [`hash`] - Content hashing with FxHash (non-cryptographic)
//! - [`strings`] - Case-folded string comparison

pub mod error;
pub mod hash;
pub mod strings;

pub use error::{Error, Result};
pub use hash::FxHasher;
