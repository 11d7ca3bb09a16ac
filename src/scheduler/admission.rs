//! The admit/deny decision for starting a new autonomous task.
//!
//! Four short-circuit checks, each denial carrying a human-readable reason:
//! daily spend cap, quota availability, pending work, and the concurrency
//! ceiling (the lesser of the rolling-window parallelism and the weekly
//! budget ceiling).

use chrono::Utc;
use eyre::Result;

use crate::config::Config;
use crate::domain::TaskStatus;
use crate::quota::estimator::estimate_remaining;
use crate::scheduler::concurrency::window_parallelism;
use crate::storage::Store;

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub reason: String,
}

impl Decision {
    fn deny(reason: String) -> Self {
        Self {
            allowed: false,
            reason,
        }
    }

    fn allow(reason: String) -> Self {
        Self {
            allowed: true,
            reason,
        }
    }
}

/// Decide whether a new autonomous task may start now.
///
/// `weekly_ceiling` comes from the Weekly Budget Controller's cached value;
/// `running_count` is the number of currently executing tasks;
/// `estimated_next_cost` is the projected spend of the task about to start.
pub fn decide(
    store: &Store,
    config: &Config,
    weekly_ceiling: usize,
    running_count: usize,
    estimated_next_cost: f64,
) -> Result<Decision> {
    // Check 1: daily spend cap
    let daily_limit = config.budget.max_daily_usd;
    let daily_spent = store.daily_autonomous_cost(Utc::now())?;
    if daily_spent >= daily_limit {
        return Ok(Decision::deny(format!(
            "Daily autonomous limit reached: ${:.2} / ${:.2}",
            daily_spent, daily_limit
        )));
    }
    let remaining_daily = daily_limit - daily_spent;
    if estimated_next_cost > remaining_daily {
        return Ok(Decision::deny(format!(
            "Estimated cost ${:.2} exceeds remaining daily budget ${:.2}",
            estimated_next_cost, remaining_daily
        )));
    }

    // Check 2: quota-level availability for the default tier
    let status = estimate_remaining(store, config, config.default_tier())?;
    if status.available_for_autonomous == 0 {
        return Ok(Decision::deny(
            "Insufficient quota remaining (safety margin enforced)".to_string(),
        ));
    }

    // Check 3: pending work exists
    let pending = store.count_by_status(TaskStatus::Pending)?;
    if pending == 0 {
        return Ok(Decision::deny("No pending tasks in queue".to_string()));
    }

    // Check 4: concurrency ceiling
    let hours_until_reset =
        ((status.window_end - Utc::now()).num_seconds() as f64 / 3600.0).max(0.0);
    let window_limit = window_parallelism(
        status.remaining_pct,
        hours_until_reset,
        config.quota.window_hours as f64,
        config.daemon.max_parallel_tasks,
    );
    let max_parallel = window_limit.min(weekly_ceiling.max(1));
    if running_count >= max_parallel {
        return Ok(Decision::deny(format!(
            "{} task(s) already running (limit {})",
            running_count, max_parallel
        )));
    }

    Ok(Decision::allow(format!(
        "{} pending task(s), {}/{} slots in use, quota {:.0}% remaining",
        pending, running_count, max_parallel, status.remaining_pct
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CorrectionScope, ModelTier, QuotaCorrection, Task, UsageEvent};
    use crate::quota::estimator::ensure_window;
    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn add_pending(store: &Store) {
        store.insert_task(&Task::manual("pending work", "")).unwrap();
    }

    fn spend(store: &Store, cost: f64) {
        store
            .insert_usage(&UsageEvent {
                id: 0,
                timestamp: Utc::now(),
                tier: ModelTier::Sonnet,
                input_tokens: 0,
                output_tokens: 0,
                cost_usd: cost,
                task_id: None,
                autonomous: true,
            })
            .unwrap();
    }

    #[test]
    fn test_allows_with_fresh_state() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);

        let decision = decide(&store, &config, 4, 0, 0.0).unwrap();
        assert!(decision.allowed, "reason: {}", decision.reason);
        assert!(decision.reason.contains("pending"));
    }

    #[test]
    fn test_denies_daily_cap_reached() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);
        spend(&store, 10.0);

        let decision = decide(&store, &config, 4, 0, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Daily autonomous limit"));
    }

    #[test]
    fn test_denies_next_cost_over_remaining_budget() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);
        spend(&store, 9.50);

        let decision = decide(&store, &config, 4, 0, 1.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("daily budget"));
    }

    #[test]
    fn test_denies_quota_exhausted() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);

        let window = ensure_window(&store, &config).unwrap();
        store
            .insert_correction(&QuotaCorrection {
                id: 0,
                window_id: window.id,
                tier: Some(ModelTier::Sonnet),
                scope: CorrectionScope::Session,
                pct_used: 100.0,
                corrected_at: Utc::now(),
            })
            .unwrap();

        let decision = decide(&store, &config, 4, 0, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("quota"));
    }

    #[test]
    fn test_denies_no_pending_tasks() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        let decision = decide(&store, &config, 4, 0, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("pending"));
    }

    #[test]
    fn test_denies_at_concurrency_ceiling() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);

        // Fresh window allows 4; 4 already running hits the ceiling
        let decision = decide(&store, &config, 4, 4, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("running"));
    }

    #[test]
    fn test_weekly_ceiling_binds() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);

        // Window would allow 4, weekly budget only 1
        let decision = decide(&store, &config, 1, 1, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("limit 1"));
    }

    #[test]
    fn test_below_ceiling_allows_second_task() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        add_pending(&store);

        let decision = decide(&store, &config, 4, 1, 0.0).unwrap();
        assert!(decision.allowed, "reason: {}", decision.reason);
    }

    #[test]
    fn test_denial_order_budget_first() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        // Everything else would also deny, but the daily cap comes first
        spend(&store, 10.0);

        let decision = decide(&store, &config, 1, 4, 0.0).unwrap();
        assert!(!decision.allowed);
        assert!(decision.reason.contains("Daily autonomous limit"));
    }
}
