//! Idle window prediction from learned schedule patterns.
//!
//! Forecasts when the operator will be away, estimates the quota that
//! would go unused, and predicts the next return. With no recorded
//! patterns there is no forecast: the predictor returns nothing rather
//! than guessing.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use eyre::Result;
use std::collections::HashMap;

use crate::config::Config;
use crate::domain::SchedulePattern;
use crate::storage::Store;

/// Probability below which an hour counts as idle.
const IDLE_PROBABILITY_THRESHOLD: f64 = 0.25;

/// Probability at or above which an hour counts as active.
const ACTIVE_PROBABILITY_THRESHOLD: f64 = 0.50;

/// One predicted span of operator absence.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_hours: f64,
    /// Average (1 - activity_probability) over the window; 0.5 for slots
    /// with no data
    pub confidence: f64,
}

fn pattern_lookup(store: &Store) -> Result<HashMap<(u32, u32), SchedulePattern>> {
    Ok(store
        .patterns()?
        .into_iter()
        .map(|p| ((p.day_of_week, p.hour), p))
        .collect())
}

fn truncate_to_hour(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.date_naive()
        .and_hms_opt(dt.hour(), 0, 0)
        .expect("valid hour")
        .and_utc()
}

/// Predict idle windows over the next `hours_ahead` hours.
///
/// Returns an empty forecast when no patterns have been learned yet.
pub fn predict_idle_windows(store: &Store, hours_ahead: u32) -> Result<Vec<IdleWindow>> {
    let lookup = pattern_lookup(store)?;
    if lookup.is_empty() {
        return Ok(Vec::new());
    }

    let now = Utc::now();

    // Label each forecast hour idle or active
    let mut hours: Vec<(DateTime<Utc>, bool, f64)> = Vec::with_capacity(hours_ahead as usize);
    for offset in 0..hours_ahead {
        let dt = truncate_to_hour(now + Duration::hours(offset as i64));
        let slot = (dt.weekday().num_days_from_monday(), dt.hour());
        let (is_idle, confidence) = match lookup.get(&slot) {
            Some(p) if p.sample_count > 0 => (
                p.activity_probability < IDLE_PROBABILITY_THRESHOLD,
                1.0 - p.activity_probability,
            ),
            // No data for this slot: mildly idle, low confidence
            _ => (true, 0.5),
        };
        hours.push((dt, is_idle, confidence));
    }

    // Group consecutive idle hours into windows
    let mut windows = Vec::new();
    let mut i = 0;
    while i < hours.len() {
        if !hours[i].1 {
            i += 1;
            continue;
        }
        let start = hours[i].0;
        let mut confidences = vec![hours[i].2];
        let mut j = i + 1;
        while j < hours.len() && hours[j].1 {
            confidences.push(hours[j].2);
            j += 1;
        }
        let end = hours[j - 1].0 + Duration::hours(1);
        windows.push(IdleWindow {
            start,
            end,
            duration_hours: (end - start).num_seconds() as f64 / 3600.0,
            confidence: confidences.iter().sum::<f64>() / confidences.len() as f64,
        });
        i = j;
    }

    Ok(windows)
}

/// Predict when the operator will next become active.
///
/// Scans forward up to one week for the next hour whose activity
/// probability reaches the active threshold. None when no such hour is
/// recorded.
pub fn predict_next_return(store: &Store) -> Result<Option<DateTime<Utc>>> {
    let lookup = pattern_lookup(store)?;
    let now = Utc::now();

    for offset in 1..=168 {
        let dt = truncate_to_hour(now + Duration::hours(offset));
        let slot = (dt.weekday().num_days_from_monday(), dt.hour());
        if let Some(p) = lookup.get(&slot)
            && p.activity_probability >= ACTIVE_PROBABILITY_THRESHOLD
        {
            return Ok(Some(dt));
        }
    }

    Ok(None)
}

/// Estimated waste if no autonomous work runs during predicted idle time.
#[derive(Debug, Clone, PartialEq)]
pub struct WasteEstimate {
    pub idle_hours: f64,
    pub wasted_messages: u32,
    pub wasted_cost_usd: f64,
}

/// Estimate quota wasted during predicted idle windows.
pub fn estimate_wasted_quota(
    store: &Store,
    config: &Config,
    hours_ahead: u32,
) -> Result<WasteEstimate> {
    let windows = predict_idle_windows(store, hours_ahead)?;
    let idle_hours: f64 = windows.iter().map(|w| w.duration_hours).sum();

    let messages_per_hour =
        config.quota.messages_per_window as f64 / config.quota.window_hours.max(1) as f64;
    let wasted_messages = (idle_hours * messages_per_hour) as u32;

    // Rough value estimate: ~4000 input + ~1000 output tokens per message
    let tier = config.default_tier();
    let cost_per_message = tier.cost_usd(4000, 1000);
    let wasted_cost_usd = wasted_messages as f64 * cost_per_message;

    Ok(WasteEstimate {
        idle_hours,
        wasted_messages,
        wasted_cost_usd,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn fill_patterns(store: &Store, probability: f64) {
        for dow in 0..7 {
            for hour in 0..24 {
                store
                    .upsert_pattern(&SchedulePattern {
                        day_of_week: dow,
                        hour,
                        activity_probability: probability,
                        avg_usage: 0.0,
                        sample_count: 10,
                    })
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_no_patterns_no_forecast() {
        let (store, _temp) = create_temp_store();
        assert!(predict_idle_windows(&store, 24).unwrap().is_empty());
        assert!(predict_next_return(&store).unwrap().is_none());
    }

    #[test]
    fn test_all_idle_gives_one_window() {
        let (store, _temp) = create_temp_store();
        fill_patterns(&store, 0.05);

        let windows = predict_idle_windows(&store, 8).unwrap();
        assert_eq!(windows.len(), 1);
        assert!((windows[0].duration_hours - 8.0).abs() < 1e-9);
        assert!(windows[0].confidence > 0.9);
    }

    #[test]
    fn test_all_active_gives_no_windows() {
        let (store, _temp) = create_temp_store();
        fill_patterns(&store, 0.9);

        assert!(predict_idle_windows(&store, 8).unwrap().is_empty());
    }

    #[test]
    fn test_next_return_found_when_active() {
        let (store, _temp) = create_temp_store();
        fill_patterns(&store, 0.8);

        let next = predict_next_return(&store).unwrap();
        assert!(next.is_some());
        assert!(next.unwrap() > Utc::now());
    }

    #[test]
    fn test_next_return_none_when_always_idle() {
        let (store, _temp) = create_temp_store();
        fill_patterns(&store, 0.1);

        assert!(predict_next_return(&store).unwrap().is_none());
    }

    #[test]
    fn test_waste_estimate_scales_with_idle() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        fill_patterns(&store, 0.0);

        let waste = estimate_wasted_quota(&store, &config, 10).unwrap();
        assert!((waste.idle_hours - 10.0).abs() < 1e-9);
        // 225 messages / 5h window = 45/h; 10h idle = 450 messages
        assert_eq!(waste.wasted_messages, 450);
        assert!(waste.wasted_cost_usd > 0.0);
    }

    #[test]
    fn test_waste_estimate_zero_when_active() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();
        fill_patterns(&store, 1.0);

        let waste = estimate_wasted_quota(&store, &config, 10).unwrap();
        assert_eq!(waste.idle_hours, 0.0);
        assert_eq!(waste.wasted_messages, 0);
    }
}
