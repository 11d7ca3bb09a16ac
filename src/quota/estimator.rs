//! Quota estimation: remaining capacity per tier in the rolling window.
//!
//! The estimator never blocks scheduling on bad data: a missing or
//! unparsable correction silently degrades to pure ledger counting.

use chrono::{DateTime, Utc};
use eyre::Result;

use crate::config::Config;
use crate::domain::{CorrectionScope, ModelTier, QuotaWindow};
use crate::storage::Store;

/// Remaining-capacity snapshot for one tier.
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaStatus {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub tier: ModelTier,
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub remaining_pct: f64,
    pub safety_reserved: u32,
    pub available_for_autonomous: u32,
}

/// Return the current quota window, creating one anchored at now if none exists.
pub fn ensure_window(store: &Store, config: &Config) -> Result<QuotaWindow> {
    if let Some(window) = store.current_window()? {
        return Ok(window);
    }

    let mut window = QuotaWindow {
        id: 0,
        window_start: Utc::now(),
        window_hours: config.quota.window_hours,
        estimated_limit: config.quota.messages_per_window,
        used_count: 0,
    };
    window.id = store.insert_window(&window)?;
    Ok(window)
}

/// Estimate remaining quota for a tier in the current window.
///
/// If a session-scoped correction exists for (window, tier), its percent-used
/// value is ground truth at its timestamp and ledger usage recorded strictly
/// after it is added on top. Otherwise usage is derived purely from ledger
/// counts since window start. A safety fraction of the limit is reserved for
/// interactive use and never spent by the scheduler.
pub fn estimate_remaining(store: &Store, config: &Config, tier: ModelTier) -> Result<QuotaStatus> {
    let window = ensure_window(store, config)?;
    let limit = config.tier_limit(tier);

    let correction = store
        .latest_correction(window.id, Some(tier), CorrectionScope::Session)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, tier = %tier, "Ignoring unreadable quota correction");
            None
        });

    let (used, remaining) = match correction {
        Some(c) if (0.0..=100.0).contains(&c.pct_used) => {
            let at_correction = ((1.0 - c.pct_used / 100.0) * limit as f64).round() as u32;
            let after = store.tier_usage_count_after(tier, c.corrected_at)?;
            let remaining = at_correction.saturating_sub(after);
            (limit - remaining, remaining)
        }
        _ => {
            let used = store.tier_usage_count(tier, window.window_start)?;
            (used.min(limit), limit.saturating_sub(used))
        }
    };

    let remaining_pct = if limit > 0 {
        remaining as f64 / limit as f64 * 100.0
    } else {
        0.0
    };

    let safety_reserved = (limit as f64 * config.quota.safety_margin) as u32;
    let available_for_autonomous = remaining.saturating_sub(safety_reserved);

    Ok(QuotaStatus {
        window_start: window.window_start,
        window_end: window.window_end(),
        tier,
        limit,
        used,
        remaining,
        remaining_pct,
        safety_reserved,
        available_for_autonomous,
    })
}

/// Check whether there is budget for a task of the given estimated cost.
///
/// Considers both the quota remaining (with the safety reserve enforced)
/// and the daily autonomous spending limit.
pub fn has_budget_for_task(
    store: &Store,
    config: &Config,
    estimated_cost: f64,
    tier: ModelTier,
) -> Result<bool> {
    let status = estimate_remaining(store, config, tier)?;
    if status.available_for_autonomous == 0 {
        return Ok(false);
    }

    let daily_spent = store.daily_autonomous_cost(Utc::now())?;
    if daily_spent + estimated_cost > config.budget.max_daily_usd {
        return Ok(false);
    }

    Ok(true)
}
