//! Budget guard for task execution.

use chrono::Utc;
use eyre::Result;

use crate::config::Config;
use crate::storage::Store;

/// The budget to allocate for a single task, in USD.
///
/// The per-task cap, bounded by whatever remains of the daily limit.
pub fn task_budget(store: &Store, config: &Config) -> Result<f64> {
    let daily_spent = store.daily_autonomous_cost(Utc::now())?;
    let daily_remaining = (config.budget.max_daily_usd - daily_spent).max(0.0);
    Ok(config.budget.max_task_usd.min(daily_remaining))
}
