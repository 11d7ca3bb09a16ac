//! Configuration for Nightshift.
//!
//! Loaded from ~/.config/nightshift/nightshift.yml or .nightshift.yml
//!
//! Search order:
//! 1. Explicit path if provided
//! 2. .nightshift.yml in current directory
//! 3. ~/.config/nightshift/nightshift.yml
//! 4. Defaults

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::ModelTier;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Rolling-window quota settings.
    pub quota: QuotaConfig,

    /// Spend caps.
    pub budget: BudgetConfig,

    /// Agent CLI settings.
    pub agent: AgentConfig,

    /// Activity detection settings.
    pub activity: ActivityConfig,

    /// Daemon loop settings.
    pub daemon: DaemonConfig,

    /// Auto-generated maintenance tasks.
    pub auto_tasks: AutoTasksConfig,
}

impl Config {
    /// Load configuration with fallback chain.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // Explicit path takes precedence
        if let Some(path) = config_path {
            return Self::load_from_file(path)
                .context(format!("Failed to load config from {}", path.display()));
        }

        // Try project config
        let project_config = PathBuf::from(".nightshift.yml");
        if project_config.exists() {
            match Self::load_from_file(&project_config) {
                Ok(config) => {
                    log::info!("Loaded config from .nightshift.yml");
                    return Ok(config);
                }
                Err(e) => {
                    log::warn!("Failed to load .nightshift.yml: {}", e);
                }
            }
        }

        // Try user config
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("nightshift").join("nightshift.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", user_config.display());
                        return Ok(config);
                    }
                    Err(e) => {
                        log::warn!("Failed to load {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;
        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.quota.window_hours == 0 {
            eyre::bail!("quota.window_hours must be > 0");
        }
        if !(0.0..1.0).contains(&self.quota.safety_margin) {
            eyre::bail!("quota.safety_margin must be in [0, 1)");
        }
        if self.budget.max_daily_usd <= 0.0 {
            eyre::bail!("budget.max_daily_usd must be > 0");
        }
        if self.daemon.max_parallel_tasks == 0 {
            eyre::bail!("daemon.max_parallel_tasks must be > 0");
        }
        Ok(())
    }

    /// Per-window message limit for a tier.
    ///
    /// Resolution order: config [quota.limits] override, built-in per-tier
    /// default, legacy messages_per_window scalar.
    pub fn tier_limit(&self, tier: ModelTier) -> u32 {
        if let Some(limit) = self.quota.limits.get(tier.as_str()) {
            return *limit;
        }
        tier.default_window_limit()
    }

    /// The configured default tier.
    pub fn default_tier(&self) -> ModelTier {
        ModelTier::parse(&self.agent.model).unwrap_or(ModelTier::Sonnet)
    }

    /// Data directory for the database, PID file, and logs.
    pub fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nightshift")
    }
}

/// Rolling-window quota settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Rolling window duration in hours.
    pub window_hours: u32,

    /// Legacy scalar limit; per-tier defaults normally win.
    pub messages_per_window: u32,

    /// Fraction of quota reserved for interactive use.
    pub safety_margin: f64,

    /// Per-tier limit overrides keyed by alias (haiku/sonnet/opus).
    pub limits: HashMap<String, u32>,

    /// Weekly usage target at reset time, percent.
    pub weekly_target_pct: f64,

    /// Weekly reset weekday, 0 = Monday (UTC).
    pub weekly_reset_day: u32,

    /// Weekly reset hour (UTC).
    pub weekly_reset_hour: u32,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            window_hours: 5,
            messages_per_window: 225,
            safety_margin: 0.15,
            limits: HashMap::new(),
            weekly_target_pct: 90.0,
            weekly_reset_day: 0,
            weekly_reset_hour: 0,
        }
    }
}

/// Spend caps for autonomous execution.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum USD per autonomous task.
    pub max_task_usd: f64,

    /// Maximum USD per day for autonomous execution.
    pub max_daily_usd: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_task_usd: 2.00,
            max_daily_usd: 10.00,
        }
    }
}

/// Agent CLI settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent CLI binary name or path.
    pub binary: String,

    /// Default tier alias (haiku/sonnet/opus) or full model id.
    pub model: String,

    /// Let the selector pick a tier per task.
    pub auto_select_model: bool,

    /// Extra flags appended to every agent invocation.
    pub extra_flags: Vec<String>,

    /// Per-execution timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary: "claude".to_string(),
            model: "sonnet".to_string(),
            auto_select_model: true,
            extra_flags: Vec::new(),
            timeout_secs: 600,
        }
    }
}

/// Activity detection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivityConfig {
    /// Minutes of inactivity before the operator counts as idle.
    pub idle_threshold_minutes: u32,

    /// Stop starting tasks this many minutes before a predicted return.
    pub return_buffer_minutes: u32,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            idle_threshold_minutes: 30,
            return_buffer_minutes: 15,
        }
    }
}

/// Daemon loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Seconds between poll cycles.
    pub poll_interval_secs: u64,

    /// Hard cap on concurrent autonomous tasks.
    pub max_parallel_tasks: usize,

    /// Minutes between weekly-budget samples.
    pub weekly_update_minutes: u64,

    /// Periodically fetch the usage API and apply it as corrections.
    pub auto_sync: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            max_parallel_tasks: 4,
            weekly_update_minutes: 30,
            auto_sync: true,
        }
    }
}

/// Auto-generated maintenance task settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoTasksConfig {
    /// Master switch; off by default.
    pub enabled: bool,

    /// Repository the templates inspect; empty means the scan path.
    pub work_dir: String,

    /// Per-template overrides keyed by task type.
    pub templates: HashMap<String, AutoTaskOverride>,
}

impl Default for AutoTasksConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            work_dir: String::new(),
            templates: HashMap::new(),
        }
    }
}

/// Per-template configuration override.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AutoTaskOverride {
    pub enabled: Option<bool>,
    pub interval_hours: Option<u32>,
    pub min_commits: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.quota.window_hours, 5);
        assert_eq!(config.quota.messages_per_window, 225);
        assert!((config.quota.safety_margin - 0.15).abs() < 1e-9);
        assert!((config.budget.max_daily_usd - 10.0).abs() < 1e-9);
        assert_eq!(config.daemon.poll_interval_secs, 60);
        assert_eq!(config.daemon.max_parallel_tasks, 4);
    }

    #[test]
    fn test_tier_limit_builtin_defaults() {
        let config = Config::default();
        assert_eq!(config.tier_limit(ModelTier::Sonnet), 225);
        assert_eq!(config.tier_limit(ModelTier::Opus), 45);
    }

    #[test]
    fn test_tier_limit_override() {
        let mut config = Config::default();
        config.quota.limits.insert("opus".to_string(), 60);
        assert_eq!(config.tier_limit(ModelTier::Opus), 60);
        assert_eq!(config.tier_limit(ModelTier::Sonnet), 225);
    }

    #[test]
    fn test_default_tier() {
        let config = Config::default();
        assert_eq!(config.default_tier(), ModelTier::Sonnet);

        let mut config = Config::default();
        config.agent.model = "opus".to_string();
        assert_eq!(config.default_tier(), ModelTier::Opus);
    }

    #[test]
    fn test_default_tier_unknown_falls_back() {
        let mut config = Config::default();
        config.agent.model = "not-a-model".to_string();
        assert_eq!(config.default_tier(), ModelTier::Sonnet);
    }

    #[test]
    fn test_validate_rejects_zero_window() {
        let mut config = Config::default();
        config.quota.window_hours = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_margin() {
        let mut config = Config::default();
        config.quota.safety_margin = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
quota:
  window_hours: 6
  safety_margin: 0.2
  limits:
    sonnet: 300
budget:
  max_daily_usd: 20.0
agent:
  model: opus
  auto_select_model: false
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.quota.window_hours, 6);
        assert_eq!(config.tier_limit(ModelTier::Sonnet), 300);
        assert!((config.budget.max_daily_usd - 20.0).abs() < 1e-9);
        assert!(!config.agent.auto_select_model);
        assert_eq!(config.default_tier(), ModelTier::Opus);
        // Unspecified sections keep defaults
        assert_eq!(config.daemon.poll_interval_secs, 60);
    }
}
