//! Weekly quota budget: solve for max parallel tasks from the consumption rate.
//!
//! Every 30 minutes the daemon feeds a fresh usage snapshot into
//! `WeeklyBudget::update`, which:
//!
//! 1. Estimates the weekly consumption rate by comparing to the previous
//!    sample and normalising by the task count running at that time.
//! 2. Solves for the largest parallel count `n` such that
//!    `week_pct + rate_per_task * n * hours_until_reset <= target_pct`,
//!    i.e. running at `n` continuously until the weekly reset lands at
//!    exactly the target percentage.
//!
//! All state lives on the instance so independently configured schedulers
//! (and tests) cannot interfere with each other.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};

use crate::quota::usage_api::UsageSnapshot;

/// Ceiling used until two consecutive samples make a rate available.
pub const INITIAL_PARALLEL_LIMIT: usize = 2;

/// Hours until the weekly quota window resets.
///
/// `reset_day` is 0=Monday..6=Sunday, `reset_hour` is a UTC hour.
pub fn hours_until_weekly_reset(now: DateTime<Utc>, reset_day: u32, reset_hour: u32) -> f64 {
    let weekday = now.weekday().num_days_from_monday();
    let mut days_ahead = reset_day as i64 - weekday as i64;
    if days_ahead < 0 {
        days_ahead += 7;
    } else if days_ahead == 0 && now.hour() >= reset_hour {
        days_ahead = 7;
    }

    let next_reset = (now + Duration::days(days_ahead))
        .date_naive()
        .and_hms_opt(reset_hour, 0, 0)
        .expect("reset hour is valid")
        .and_utc();

    ((next_reset - now).num_seconds() as f64 / 3600.0).max(0.0)
}

/// Solve for the max parallel count that keeps weekly usage at or below
/// `target_pct` by reset time.
///
/// `rate_pct_per_hour` is the total observed rate; dividing by `n_running`
/// (the task count observed during the rate window) gives the per-task rate.
/// Returns an integer in [1, cap]: 1 when already at or over the target,
/// `cap` when no usable rate exists.
pub fn compute_weekly_ceiling(
    week_pct: f64,
    rate_pct_per_hour: f64,
    hours_until_reset: f64,
    n_running: usize,
    target_pct: f64,
    cap: usize,
) -> usize {
    let remaining = target_pct - week_pct;
    if remaining <= 0.0 {
        return 1;
    }
    if rate_pct_per_hour <= 0.0 || hours_until_reset <= 0.0 {
        return cap;
    }

    let rate_per_task = rate_pct_per_hour / n_running.max(1) as f64;
    let n = remaining / (rate_per_task * hours_until_reset);
    (n as usize).clamp(1, cap)
}

/// Weekly budget controller.
///
/// Owns the sampling state (last percentage, last sample time, running count
/// at sample time) and the cached parallelism ceiling.
#[derive(Debug, Clone)]
pub struct WeeklyBudget {
    target_pct: f64,
    cap: usize,
    last_week_pct: Option<f64>,
    last_checked_at: Option<DateTime<Utc>>,
    last_n_running: usize,
    ceiling: usize,
}

impl WeeklyBudget {
    /// Create a controller with the given target percentage and hard cap.
    pub fn new(target_pct: f64, cap: usize) -> Self {
        Self {
            target_pct,
            cap,
            last_week_pct: None,
            last_checked_at: None,
            last_n_running: 1,
            ceiling: INITIAL_PARALLEL_LIMIT.min(cap.max(1)),
        }
    }

    /// The most recently computed ceiling. Cheap, never blocks.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Recompute the ceiling from a fresh usage snapshot.
    ///
    /// `snapshot` is None when the external fetch failed; the previous
    /// ceiling is kept unchanged in that case. `running_now` is recorded as
    /// the normalisation base for the next sample's rate.
    pub fn update(
        &mut self,
        snapshot: Option<&UsageSnapshot>,
        hours_until_reset: f64,
        running_now: usize,
        now: DateTime<Utc>,
    ) -> usize {
        let Some(snapshot) = snapshot else {
            return self.ceiling;
        };
        let Some(week_pct) = snapshot.week_all_pct else {
            return self.ceiling;
        };

        // Rate from consecutive measurements, normalised later by the task
        // count observed at the previous sample.
        let rate_per_hour = match (self.last_week_pct, self.last_checked_at) {
            (Some(prev_pct), Some(prev_at)) => {
                let delta_hours = (now - prev_at).num_seconds() as f64 / 3600.0;
                let delta_pct = week_pct - prev_pct;
                if delta_hours > 0.0 && delta_pct > 0.0 {
                    Some(delta_pct / delta_hours)
                } else {
                    None
                }
            }
            _ => None,
        };
        let n_running_for_rate = self.last_n_running;

        // Persist readings for the next cycle
        self.last_week_pct = Some(week_pct);
        self.last_checked_at = Some(now);
        self.last_n_running = running_now.max(1);

        self.ceiling = if week_pct >= self.target_pct {
            1
        } else {
            match rate_per_hour {
                // No usable rate yet (first sample, week just reset, or no
                // activity): stay conservative rather than opening the cap.
                None => INITIAL_PARALLEL_LIMIT.min(self.cap.max(1)),
                Some(rate) => compute_weekly_ceiling(
                    week_pct,
                    rate,
                    hours_until_reset,
                    n_running_for_rate,
                    self.target_pct,
                    self.cap,
                ),
            }
        };

        tracing::info!(
            week_pct,
            hours_until_reset,
            rate = rate_per_hour.unwrap_or(0.0),
            n_running = n_running_for_rate,
            ceiling = self.ceiling,
            target = self.target_pct,
            "Weekly budget updated"
        );
        self.ceiling
    }
}
