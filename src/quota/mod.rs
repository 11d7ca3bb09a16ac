//! Quota accounting: the usage ledger, remaining-capacity estimation,
//! external corrections, and the weekly budget ceiling.

pub mod corrections;
pub mod estimator;
pub mod tracker;
pub mod usage_api;
pub mod weekly;

pub use estimator::{QuotaStatus, estimate_remaining, has_budget_for_task};
pub use usage_api::UsageSnapshot;
pub use weekly::WeeklyBudget;
