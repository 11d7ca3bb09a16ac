//! Fetch quota utilization from Anthropic's OAuth usage endpoint.
//!
//! This reads the same data Claude Code's /usage command displays, via the
//! undocumented internal endpoint `GET /api/oauth/usage`. The bearer token
//! comes from ~/.claude/.credentials.json, which Claude Code maintains
//! (including refresh).
//!
//! The endpoint is not officially documented and may change without notice,
//! so every failure mode degrades to `None` rather than an error.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

const USAGE_URL: &str = "https://api.anthropic.com/api/oauth/usage";
const BETA_HEADER: &str = "oauth-2025-04-20";
const USER_AGENT: &str = "claude-code/2.1.45";

/// Parsed usage percentages from the API.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSnapshot {
    /// "Current session X%" - rolling window utilization
    pub five_hour_pct: f64,
    /// "Current week (all models) X%"
    pub week_all_pct: Option<f64>,
    /// "Current week (sonnet only) X%"
    pub week_sonnet_pct: Option<f64>,
    /// When the rolling window resets
    pub five_hour_resets_at: Option<DateTime<Utc>>,
}

fn credentials_file() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".claude").join(".credentials.json"))
}

/// Read the OAuth access token from Claude Code's credentials file.
fn read_token() -> Option<String> {
    let path = credentials_file()?;
    let content = std::fs::read_to_string(path).ok()?;
    let data: Value = serde_json::from_str(&content).ok()?;
    data.get("claudeAiOauth")?
        .get("accessToken")?
        .as_str()
        .map(String::from)
}

fn parse_dt(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = value?.as_str()?;
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_pct(bucket: Option<&Value>) -> Option<f64> {
    bucket?.get("utilization")?.as_f64()
}

/// Parse the raw endpoint response into a snapshot.
pub fn parse_snapshot(data: &Value) -> UsageSnapshot {
    let five_hour = data.get("five_hour");
    UsageSnapshot {
        five_hour_pct: parse_pct(five_hour).unwrap_or(0.0),
        week_all_pct: parse_pct(data.get("seven_day")),
        week_sonnet_pct: parse_pct(data.get("seven_day_sonnet")),
        five_hour_resets_at: parse_dt(five_hour.and_then(|f| f.get("resets_at"))),
    }
}

/// Fetch current quota utilization from the OAuth usage API.
///
/// Returns None if the credentials file is missing, the token is invalid,
/// or the request fails. Never errors.
pub async fn fetch_usage() -> Option<UsageSnapshot> {
    let token = read_token()?;

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .ok()?;

    let response = client
        .get(USAGE_URL)
        .bearer_auth(token)
        .header("anthropic-beta", BETA_HEADER)
        .header("Accept", "application/json")
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        tracing::debug!(status = %response.status(), "Usage endpoint returned an error");
        return None;
    }

    let data: Value = response.json().await.ok()?;
    Some(parse_snapshot(&data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full_snapshot() {
        let data = json!({
            "five_hour": {"utilization": 12.5, "resets_at": "2026-08-07T15:00:00+00:00"},
            "seven_day": {"utilization": 28.0},
            "seven_day_sonnet": {"utilization": 4.0},
        });
        let snapshot = parse_snapshot(&data);
        assert!((snapshot.five_hour_pct - 12.5).abs() < 1e-9);
        assert_eq!(snapshot.week_all_pct, Some(28.0));
        assert_eq!(snapshot.week_sonnet_pct, Some(4.0));
        assert!(snapshot.five_hour_resets_at.is_some());
    }

    #[test]
    fn test_parse_missing_buckets() {
        let data = json!({});
        let snapshot = parse_snapshot(&data);
        assert_eq!(snapshot.five_hour_pct, 0.0);
        assert_eq!(snapshot.week_all_pct, None);
        assert_eq!(snapshot.week_sonnet_pct, None);
        assert!(snapshot.five_hour_resets_at.is_none());
    }

    #[test]
    fn test_parse_bad_reset_timestamp() {
        let data = json!({
            "five_hour": {"utilization": 1.0, "resets_at": "not-a-date"},
        });
        let snapshot = parse_snapshot(&data);
        assert!(snapshot.five_hour_resets_at.is_none());
    }
}
