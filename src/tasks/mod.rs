//! Task queue: scoring, tier selection, and ingestion sources.

pub mod model_select;
pub mod prioritizer;
pub mod queue;
pub mod sources;

pub use model_select::select_tier;
pub use prioritizer::{calculate_priority, reprioritize_all};
pub use queue::next_task;
