//! Generation-based memory reclamation.
//!
//! | Type | Role |
//! |------|------|
//! | [`GenerationHandler`] | Current generation plus reader guards |
//! | [`GenerationGuard`] | A reader's lease on one generation |
//! | [`GenerationHolder`] | Retired items waiting for readers to move on |

mod generation_handler;
mod hold_list;

pub use generation_handler::{GenerationGuard, GenerationHandler};
pub use hold_list::GenerationHolder;
