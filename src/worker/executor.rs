//! Agent CLI execution wrapper.
//!
//! Runs `claude -p <prompt> --output-format json` as an isolated process
//! with a spend ceiling and a timeout. Every failure mode (non-zero exit,
//! timeout, missing binary, unparsable output) is captured into the
//! returned result; nothing raises into the scheduler.

use chrono::Utc;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;

use crate::config::Config;
use crate::domain::ModelTier;
use crate::quota::tracker::record_usage;
use crate::storage::Store;

/// Result from one agent execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    pub success: bool,
    pub output: String,
    pub cost_usd: f64,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub duration_seconds: f64,
    pub error: String,
}

impl ExecutionResult {
    fn failure(error: &str, duration_seconds: f64) -> Self {
        Self {
            success: false,
            output: String::new(),
            cost_usd: 0.0,
            input_tokens: 0,
            output_tokens: 0,
            duration_seconds,
            error: error.to_string(),
        }
    }
}

/// Build the agent CLI argument list.
pub fn build_agent_args(
    prompt: &str,
    max_budget_usd: f64,
    tier: ModelTier,
    extra_flags: &[String],
) -> Vec<String> {
    let mut args = vec![
        "-p".to_string(),
        prompt.to_string(),
        "--output-format".to_string(),
        "json".to_string(),
        "--max-turns".to_string(),
        "50".to_string(),
        format!("--max-budget-usd={}", max_budget_usd),
        "--model".to_string(),
        tier.model_id().to_string(),
    ];
    args.extend(extra_flags.iter().cloned());
    args
}

/// Extract result text, token counts, and cost from the CLI's JSON output.
///
/// Falls back to the raw stdout when the output is not valid JSON.
fn parse_output(stdout: &str) -> (String, u32, u32, f64) {
    let Ok(data) = serde_json::from_str::<Value>(stdout) else {
        return (stdout.to_string(), 0, 0, 0.0);
    };

    let output = data
        .get("result")
        .and_then(|v| v.as_str())
        .map(String::from)
        .unwrap_or_else(|| stdout.to_string());

    let mut input_tokens = data.get("input_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let mut output_tokens = data.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let cost_usd = data.get("cost_usd").and_then(|v| v.as_f64()).unwrap_or(0.0);

    // Prefer the usage block when present
    if let Some(usage) = data.get("usage") {
        input_tokens = usage
            .get("input_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(input_tokens);
        output_tokens = usage
            .get("output_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(output_tokens);
    }

    (output, input_tokens as u32, output_tokens as u32, cost_usd)
}

/// Execute a task prompt with the agent CLI.
///
/// Records a ledger entry for the execution (with the autonomous flag set)
/// whenever the process actually ran. The store lock is only taken after
/// the process has finished.
pub async fn execute_task(
    store: &Mutex<Store>,
    config: &Config,
    prompt: &str,
    work_dir: &str,
    task_id: Option<i64>,
    max_budget_usd: f64,
    tier: ModelTier,
) -> ExecutionResult {
    let args = build_agent_args(prompt, max_budget_usd, tier, &config.agent.extra_flags);
    let timeout = Duration::from_secs(config.agent.timeout_secs);
    let start = Utc::now();

    let child = Command::new(&config.agent.binary)
        .args(&args)
        .current_dir(work_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let child = match child {
        Ok(child) => child,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return ExecutionResult::failure(
                &format!("{} CLI not found. Is it installed?", config.agent.binary),
                0.0,
            );
        }
        Err(e) => {
            return ExecutionResult::failure(&format!("Failed to spawn agent: {}", e), 0.0);
        }
    };

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            let duration = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
            return ExecutionResult::failure(&format!("Agent process error: {}", e), duration);
        }
        Err(_) => {
            let duration = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
            tracing::warn!(timeout_secs = timeout.as_secs(), "Agent execution timed out");
            return ExecutionResult::failure("Task timed out", duration);
        }
    };

    let duration = (Utc::now() - start).num_milliseconds() as f64 / 1000.0;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let (output_text, input_tokens, output_tokens, cost_usd) = parse_output(&stdout);

    {
        let store = store.lock().expect("store lock poisoned");
        if let Err(e) = record_usage(&store, tier, input_tokens, output_tokens, task_id, true) {
            tracing::error!(error = %e, "Failed to record usage for execution");
        }
    }

    let success = output.status.success();
    let error = if success {
        String::new()
    } else {
        String::from_utf8_lossy(&output.stderr).to_string()
    };

    ExecutionResult {
        success,
        output: output_text,
        cost_usd,
        input_tokens,
        output_tokens,
        duration_seconds: duration,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_agent_args() {
        let args = build_agent_args("do the thing", 1.5, ModelTier::Sonnet, &[]);
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "do the thing");
        assert!(args.contains(&"--output-format".to_string()));
        assert!(args.contains(&"json".to_string()));
        assert!(args.contains(&"--max-budget-usd=1.5".to_string()));
        assert!(args.contains(&"claude-sonnet-4-5-20250929".to_string()));
    }

    #[test]
    fn test_build_agent_args_extra_flags() {
        let flags = vec!["--dangerously-skip-permissions".to_string()];
        let args = build_agent_args("x", 1.0, ModelTier::Haiku, &flags);
        assert_eq!(args.last().unwrap(), "--dangerously-skip-permissions");
    }

    #[test]
    fn test_parse_output_full_json() {
        let stdout = r#"{"result": "All done", "cost_usd": 0.42, "usage": {"input_tokens": 1200, "output_tokens": 300}}"#;
        let (output, input, out_tokens, cost) = parse_output(stdout);
        assert_eq!(output, "All done");
        assert_eq!(input, 1200);
        assert_eq!(out_tokens, 300);
        assert!((cost - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_parse_output_top_level_tokens() {
        let stdout = r#"{"result": "ok", "input_tokens": 10, "output_tokens": 5}"#;
        let (_, input, out_tokens, _) = parse_output(stdout);
        assert_eq!(input, 10);
        assert_eq!(out_tokens, 5);
    }

    #[test]
    fn test_parse_output_not_json() {
        let (output, input, out_tokens, cost) = parse_output("plain text output");
        assert_eq!(output, "plain text output");
        assert_eq!(input, 0);
        assert_eq!(out_tokens, 0);
        assert_eq!(cost, 0.0);
    }

    #[test]
    fn test_parse_output_json_without_result() {
        let stdout = r#"{"cost_usd": 0.1}"#;
        let (output, _, _, cost) = parse_output(stdout);
        assert_eq!(output, stdout);
        assert!((cost - 0.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_execute_missing_binary_is_captured() {
        use tempfile::TempDir;

        let temp = TempDir::new().unwrap();
        let store = Mutex::new(Store::open_at(temp.path()).unwrap());
        let mut config = Config::default();
        config.agent.timeout_secs = 5;
        config.agent.binary = "/nonexistent/agent-binary".to_string();

        let result = execute_task(
            &store,
            &config,
            "prompt",
            temp.path().to_str().unwrap(),
            None,
            1.0,
            ModelTier::Haiku,
        )
        .await;

        assert!(!result.success);
        assert!(result.error.contains("not found"));
    }
}
