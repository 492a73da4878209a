//! Chunked, audited style edits over the card database.

mod engine;
mod events;
mod presets;

pub use engine::{MutationOutcome, MutationReport, StyleMutationEngine};
pub use events::StyleEvent;
pub use presets::{StyleCommand, StyleRequest};
