//! External quota corrections.
//!
//! Claude's /usage command shows three usage percentages: current session,
//! current week (all models), and current week (sonnet only). Corrections
//! store those percentages scoped to (window, tier, scope); the estimator
//! treats the newest session-scoped one as ground truth at its timestamp.

use chrono::Utc;
use eyre::Result;

use crate::config::Config;
use crate::domain::{CorrectionScope, QuotaCorrection};
use crate::quota::estimator::ensure_window;
use crate::quota::usage_api::{UsageSnapshot, fetch_usage};
use crate::storage::Store;

/// Record usage percentages read from Claude's /usage display.
///
/// `session` corrects the rolling window for the default tier; the weekly
/// values are stored for trend display and the weekly budget controller.
/// Each argument is independent; pass only what should be updated.
pub fn apply_correction(
    store: &Store,
    config: &Config,
    session: Option<f64>,
    week_all: Option<f64>,
    week_tier: Option<f64>,
) -> Result<Vec<QuotaCorrection>> {
    let window = ensure_window(store, config)?;
    let tier = config.default_tier();
    let now = Utc::now();
    let mut applied = Vec::new();

    let entries = [
        (session, Some(tier), CorrectionScope::Session),
        (week_all, None, CorrectionScope::WeekAll),
        (week_tier, Some(tier), CorrectionScope::WeekTier),
    ];

    for (pct, scope_tier, scope) in entries {
        let Some(pct) = pct else { continue };
        if !(0.0..=100.0).contains(&pct) {
            eyre::bail!("Correction percentage must be between 0 and 100, got {}", pct);
        }
        let mut correction = QuotaCorrection {
            id: 0,
            window_id: window.id,
            tier: scope_tier,
            scope,
            pct_used: pct,
            corrected_at: now,
        };
        correction.id = store.insert_correction(&correction)?;
        tracing::info!(scope = scope.as_str(), pct_used = pct, "Applied quota correction");
        applied.push(correction);
    }

    Ok(applied)
}

/// Apply an already-fetched snapshot as corrections.
pub fn apply_snapshot(store: &Store, config: &Config, snapshot: &UsageSnapshot) -> Result<()> {
    apply_correction(
        store,
        config,
        Some(snapshot.five_hour_pct),
        snapshot.week_all_pct,
        snapshot.week_sonnet_pct,
    )?;
    Ok(())
}

/// Fetch quota from the usage API and apply it as corrections.
///
/// Returns true if the sync succeeded. Failures are non-fatal; the
/// scheduler continues with its last known values.
pub async fn auto_sync(store: &Store, config: &Config) -> Result<bool> {
    let Some(snapshot) = fetch_usage().await else {
        return Ok(false);
    };
    apply_snapshot(store, config, &snapshot)?;
    Ok(true)
}

/// Estimated messages remaining implied by a session correction.
pub fn implied_remaining(pct_used: f64, limit: u32) -> u32 {
    ((1.0 - pct_used / 100.0) * limit as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ModelTier;
    use crate::quota::estimator::estimate_remaining;
    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_apply_session_correction() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        let applied = apply_correction(&store, &config, Some(40.0), None, None).unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].scope, CorrectionScope::Session);
        assert_eq!(applied[0].tier, Some(ModelTier::Sonnet));

        let status = estimate_remaining(&store, &config, ModelTier::Sonnet).unwrap();
        assert_eq!(status.remaining, 135); // round(0.6 * 225)
    }

    #[test]
    fn test_apply_all_three() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        let applied =
            apply_correction(&store, &config, Some(12.0), Some(28.0), Some(4.0)).unwrap();
        assert_eq!(applied.len(), 3);

        let window = ensure_window(&store, &config).unwrap();
        assert!(store
            .latest_correction(window.id, None, CorrectionScope::WeekAll)
            .unwrap()
            .is_some());
        assert!(store
            .latest_correction(window.id, Some(ModelTier::Sonnet), CorrectionScope::WeekTier)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_apply_nothing() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        let applied = apply_correction(&store, &config, None, None, None).unwrap();
        assert!(applied.is_empty());
    }

    #[test]
    fn test_out_of_range_rejected() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        assert!(apply_correction(&store, &config, Some(120.0), None, None).is_err());
        assert!(apply_correction(&store, &config, Some(-5.0), None, None).is_err());
    }

    #[test]
    fn test_apply_snapshot() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        let snapshot = UsageSnapshot {
            five_hour_pct: 50.0,
            week_all_pct: Some(30.0),
            week_sonnet_pct: None,
            five_hour_resets_at: None,
        };
        apply_snapshot(&store, &config, &snapshot).unwrap();

        let status = estimate_remaining(&store, &config, ModelTier::Sonnet).unwrap();
        assert_eq!(status.remaining, 113); // round(0.5 * 225)
    }

    #[test]
    fn test_newest_correction_wins() {
        let (store, _temp) = create_temp_store();
        let config = Config::default();

        apply_correction(&store, &config, Some(80.0), None, None).unwrap();
        apply_correction(&store, &config, Some(20.0), None, None).unwrap();

        let status = estimate_remaining(&store, &config, ModelTier::Sonnet).unwrap();
        assert_eq!(status.remaining, 180); // round(0.8 * 225)
    }

    #[test]
    fn test_implied_remaining() {
        assert_eq!(implied_remaining(0.0, 225), 225);
        assert_eq!(implied_remaining(100.0, 225), 0);
        assert_eq!(implied_remaining(40.0, 225), 135);
    }
}
