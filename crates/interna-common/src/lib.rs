//! # interna-common
//!
//! Foundation layer for interna: compact entry references, generations and
//! the reader-guard machinery that bounds memory reclamation.
//!
//! ## Modules
//!
//! - [`types`] - [`EntryRef`] and [`Generation`]
//! - [`memory`] - [`GenerationHandler`](memory::GenerationHandler) and generation-tagged hold lists
//! - [`collections`] - Hash map aliases used across the workspace
//! - [`utils`] - Error types and string folding

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod collections;
pub mod memory;
pub mod types;
pub mod utils;

pub use types::{EntryRef, Generation};
pub use utils::error::{Error, Result};
