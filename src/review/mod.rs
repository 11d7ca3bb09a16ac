//! Human review of completed autonomous work.

pub mod applicator;
pub mod reporter;

pub use applicator::{approve_task, reject_task};
pub use reporter::{ReviewDetail, review_detail, reviewable_tasks};
