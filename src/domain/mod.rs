//! Domain types shared across Nightshift.
//!
//! Everything the scheduler reasons about lives here: tasks and their
//! lifecycle, model tiers with their quota/cost profiles, and the metered
//! usage records the quota estimator consumes.

pub mod task;
pub mod tier;
pub mod usage;

pub use task::{Task, TaskSource, TaskStatus};
pub use tier::ModelTier;
pub use usage::{
    ActivitySession, CorrectionScope, QuotaCorrection, QuotaWindow, SchedulePattern, UsageEvent,
};
