//! Difficulty-based tier selection and quota-aware upgrade logic.
//!
//! Unused near-term capacity is better spent generously than wasted: when
//! the rolling window is about to reset with a surplus, or a long idle
//! stretch is forecast, the selector steps the tier up one level. The
//! final availability check steps back down if the chosen tier's quota is
//! exhausted.

use eyre::Result;

use crate::config::Config;
use crate::domain::{ModelTier, Task, TaskSource};
use crate::patterns::predictor::predict_idle_windows;
use crate::quota::estimator::estimate_remaining;
use crate::storage::Store;

/// Assessed difficulty of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskDifficulty {
    Simple,
    Medium,
    Complex,
}

const COMPLEX_KEYWORDS: &[&str] = &[
    "security",
    "vulnerability",
    "architecture",
    "migration",
    "performance",
    "critical",
    "concurrent",
    "race condition",
    "refactor",
    "redesign",
    "optimize",
    "scalab",
];

const SIMPLE_KEYWORDS: &[&str] = &[
    "docs",
    "documentation",
    "lint",
    "format",
    "typo",
    "clean",
    "todo",
    "comment",
    "rename",
    "update docs",
    "readme",
    "changelog",
    "license",
];

/// Assess task difficulty from title, description, and source.
pub fn assess_difficulty(task: &Task) -> TaskDifficulty {
    let text = format!("{} {}", task.title, task.description).to_lowercase();

    let mut complex_hits = COMPLEX_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count();
    let mut simple_hits = SIMPLE_KEYWORDS.iter().filter(|kw| text.contains(*kw)).count();

    // Generated maintenance templates lean simple
    if task.source == TaskSource::AutoTask {
        simple_hits += 1;
    }

    // Length heuristic: long descriptions suggest complexity
    let desc_len = task.description.len();
    if desc_len > 500 {
        complex_hits += 1;
    } else if desc_len < 100 {
        simple_hits += 1;
    }

    if complex_hits > simple_hits {
        TaskDifficulty::Complex
    } else if simple_hits > complex_hits {
        TaskDifficulty::Simple
    } else {
        TaskDifficulty::Medium
    }
}

fn difficulty_tier(difficulty: TaskDifficulty) -> ModelTier {
    match difficulty {
        TaskDifficulty::Simple => ModelTier::Haiku,
        TaskDifficulty::Medium => ModelTier::Sonnet,
        TaskDifficulty::Complex => ModelTier::Opus,
    }
}

/// Determine whether to upgrade the tier based on the quota situation.
///
/// Returns (should_upgrade, reason). Conditions:
/// 1. Window ends in < 1.5h with > 30% quota remaining.
/// 2. An idle stretch of >= 6h is forecast within the next 8h with > 40%
///    quota remaining.
pub fn should_upgrade(store: &Store, config: &Config) -> (bool, String) {
    let status = match estimate_remaining(store, config, config.default_tier()) {
        Ok(status) => status,
        Err(e) => {
            tracing::warn!(error = %e, "Quota estimate unavailable, skipping upgrade check");
            return (false, String::new());
        }
    };

    let hours_left =
        (status.window_end - chrono::Utc::now()).num_seconds() as f64 / 3600.0;

    if hours_left < 1.5 && status.remaining_pct > 30.0 {
        return (
            true,
            format!(
                "window ending in {:.1}h with {:.0}% remaining",
                hours_left, status.remaining_pct
            ),
        );
    }

    if status.remaining_pct > 40.0 {
        let windows = predict_idle_windows(store, 8).unwrap_or_default();
        if windows.iter().any(|w| w.duration_hours >= 6.0) {
            return (
                true,
                format!("long idle predicted with {:.0}% remaining", status.remaining_pct),
            );
        }
    }

    (false, String::new())
}

fn tier_has_quota(store: &Store, config: &Config, tier: ModelTier) -> bool {
    estimate_remaining(store, config, tier)
        .map(|s| s.available_for_autonomous > 0)
        .unwrap_or(false)
}

/// Select the tier for a task. Main entry point.
///
/// 1. Auto-select disabled: return the configured default tier verbatim.
/// 2. Task carries an explicit tier: honor it.
/// 3. Classify difficulty and map to a tier.
/// 4. Check the upgrade opportunity.
/// 5. Verify quota availability, downgrading up to two steps if exhausted.
pub fn select_tier(store: &Store, config: &Config, task: &Task) -> Result<ModelTier> {
    if !config.agent.auto_select_model {
        return Ok(config.default_tier());
    }

    if let Some(tier) = task.tier {
        return Ok(tier);
    }

    let difficulty = assess_difficulty(task);
    let mut target = difficulty_tier(difficulty);
    tracing::debug!(difficulty = ?difficulty, tier = %target, "Assessed task difficulty");

    let (upgrade, reason) = should_upgrade(store, config);
    if upgrade {
        let original = target;
        target = target.upgrade();
        if target != original {
            tracing::info!(from = %original, to = %target, reason = %reason, "Upgrading tier");
        }
    }

    if !tier_has_quota(store, config, target) {
        let original = target;
        target = target.downgrade();
        tracing::info!(from = %original, to = %target, "Downgrading tier: quota exhausted");

        if !tier_has_quota(store, config, target) {
            target = target.downgrade();
            tracing::info!(to = %target, "Further downgrade");
        }
    }

    Ok(target)
}
