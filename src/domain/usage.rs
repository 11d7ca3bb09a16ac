//! Metered usage records and quota bookkeeping rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ModelTier;

/// One metered operation against the agent. Append-only once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UsageEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub tier: ModelTier,
    pub input_tokens: u32,
    pub output_tokens: u32,
    /// Derived from tier pricing at write time
    pub cost_usd: f64,
    /// Owning task, if this usage came from autonomous execution
    pub task_id: Option<i64>,
    /// True for autonomous executions, false for interactive/manual use
    pub autonomous: bool,
}

/// The current rolling accounting period. At most one is "current";
/// a new one is materialized lazily when none exists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaWindow {
    pub id: i64,
    pub window_start: DateTime<Utc>,
    pub window_hours: u32,
    /// Legacy scalar limit, used only when no per-tier limit resolves
    pub estimated_limit: u32,
    pub used_count: u32,
}

impl QuotaWindow {
    /// When this window resets.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.window_start + chrono::Duration::hours(self.window_hours as i64)
    }
}

/// Which accounting period a correction applies to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionScope {
    /// The rolling window ("Current session X%")
    Session,
    /// The long-horizon window across all tiers ("Current week (all models) X%")
    WeekAll,
    /// The long-horizon window for a single tier
    WeekTier,
}

impl CorrectionScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            CorrectionScope::Session => "session",
            CorrectionScope::WeekAll => "week_all",
            CorrectionScope::WeekTier => "week_tier",
        }
    }

    pub fn parse(s: &str) -> Option<CorrectionScope> {
        match s {
            "session" => Some(CorrectionScope::Session),
            "week_all" => Some(CorrectionScope::WeekAll),
            "week_tier" => Some(CorrectionScope::WeekTier),
            _ => None,
        }
    }
}

/// A point-in-time external truth injection: "X% of the quota was used as of
/// corrected_at". Supersedes ledger inference before its timestamp; usage
/// recorded after it is added back on top.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuotaCorrection {
    pub id: i64,
    pub window_id: i64,
    /// Tier the correction is scoped to; None means all tiers (week_all)
    pub tier: Option<ModelTier>,
    pub scope: CorrectionScope,
    /// Percent of the limit consumed at corrected_at, 0-100
    pub pct_used: f64,
    pub corrected_at: DateTime<Utc>,
}

/// Aggregated activity probability for one (weekday, hour) slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SchedulePattern {
    /// 0 = Monday
    pub day_of_week: u32,
    pub hour: u32,
    pub activity_probability: f64,
    pub avg_usage: f64,
    pub sample_count: u32,
}

/// One span of observed operator activity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivitySession {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub message_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_end() {
        let window = QuotaWindow {
            id: 1,
            window_start: Utc::now(),
            window_hours: 5,
            estimated_limit: 225,
            used_count: 0,
        };
        assert_eq!(
            window.window_end() - window.window_start,
            chrono::Duration::hours(5)
        );
    }

    #[test]
    fn test_correction_scope_round_trip() {
        for scope in [
            CorrectionScope::Session,
            CorrectionScope::WeekAll,
            CorrectionScope::WeekTier,
        ] {
            assert_eq!(CorrectionScope::parse(scope.as_str()), Some(scope));
        }
    }

    #[test]
    fn test_usage_event_serialization() {
        let event = UsageEvent {
            id: 1,
            timestamp: Utc::now(),
            tier: ModelTier::Sonnet,
            input_tokens: 1000,
            output_tokens: 500,
            cost_usd: 0.0105,
            task_id: Some(7),
            autonomous: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        let back: UsageEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
