//! Schedule pattern learning.
//!
//! Rebuilds a per-weekday, per-hour probability model of operator activity
//! from stored sessions. Each slot records the fraction of observed hours
//! that were active and the average message volume.

use chrono::{Datelike, Duration, Timelike};
use eyre::Result;
use std::collections::HashMap;

use crate::domain::SchedulePattern;
use crate::storage::Store;

/// Rebuild schedule patterns from stored activity sessions.
///
/// For every (day_of_week, hour) slot with observations, computes the
/// activity probability and average usage, then upserts the row.
pub fn update_patterns(store: &Store) -> Result<()> {
    let sessions = store.recent_sessions(5000)?;
    if sessions.is_empty() {
        return Ok(());
    }

    let mut active_counts: HashMap<(u32, u32), u32> = HashMap::new();
    let mut total_counts: HashMap<(u32, u32), u32> = HashMap::new();
    let mut usage_totals: HashMap<(u32, u32), f64> = HashMap::new();

    // The observed range determines which slots have data at all
    let earliest = sessions.iter().map(|s| s.start_time).min().expect("nonempty");
    let latest = sessions
        .iter()
        .map(|s| s.end_time.unwrap_or(s.start_time))
        .max()
        .expect("nonempty");

    // Mark every calendar hour in the range as observed
    let mut cursor = earliest
        .date_naive()
        .and_hms_opt(earliest.hour(), 0, 0)
        .expect("valid hour")
        .and_utc();
    while cursor <= latest {
        let slot = (cursor.weekday().num_days_from_monday(), cursor.hour());
        *total_counts.entry(slot).or_insert(0) += 1;
        cursor += Duration::hours(1);
    }

    // Mark every hour each session spans as active
    for session in &sessions {
        let start = session.start_time;
        let end = session.end_time.unwrap_or(start);
        let session_hours = ((end - start).num_seconds() as f64 / 3600.0).max(1.0);

        let mut hour_cursor = start
            .date_naive()
            .and_hms_opt(start.hour(), 0, 0)
            .expect("valid hour")
            .and_utc();
        while hour_cursor <= end {
            let slot = (hour_cursor.weekday().num_days_from_monday(), hour_cursor.hour());
            *active_counts.entry(slot).or_insert(0) += 1;
            *usage_totals.entry(slot).or_insert(0.0) +=
                session.message_count as f64 / session_hours;
            hour_cursor += Duration::hours(1);
        }
    }

    for (slot, total) in &total_counts {
        let active = active_counts.get(slot).copied().unwrap_or(0);
        let probability = (active as f64 / *total as f64).min(1.0);
        let avg_usage = usage_totals.get(slot).copied().unwrap_or(0.0) / *total as f64;

        store.upsert_pattern(&SchedulePattern {
            day_of_week: slot.0,
            hour: slot.1,
            activity_probability: probability,
            avg_usage,
            sample_count: *total,
        })?;
    }

    Ok(())
}

/// Render the 7x24 activity grid as display rows (Mon-Sun).
///
/// Probability buckets: `·` no data, `░` < 0.25, `▒` < 0.50,
/// `▓` < 0.75, `█` >= 0.75.
pub fn pattern_grid(store: &Store) -> Result<Vec<String>> {
    let patterns = store.patterns()?;
    let lookup: HashMap<(u32, u32), &SchedulePattern> = patterns
        .iter()
        .map(|p| ((p.day_of_week, p.hour), p))
        .collect();

    let day_names = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let mut rows = Vec::with_capacity(7);

    for (dow, name) in day_names.iter().enumerate() {
        let mut row = format!("{:>4} ", name);
        for hour in 0..24 {
            let glyph = match lookup.get(&(dow as u32, hour)) {
                None => "  ·",
                Some(p) if p.sample_count == 0 => "  ·",
                Some(p) if p.activity_probability < 0.25 => "  ░",
                Some(p) if p.activity_probability < 0.50 => "  ▒",
                Some(p) if p.activity_probability < 0.75 => "  ▓",
                Some(_) => "  █",
            };
            row.push_str(glyph);
        }
        rows.push(row);
    }

    Ok(rows)
}
