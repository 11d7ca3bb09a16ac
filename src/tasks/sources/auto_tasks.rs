//! Auto-generated routine maintenance tasks from built-in templates.
//!
//! Each template defines a trigger condition (time elapsed, git activity,
//! commit count). `scan` checks every enabled template and yields tasks for
//! those whose conditions are met. Dedup is handled by the caller via the
//! standard `(source, source_ref)` key; `source_ref` is
//! `"{task_type}:{YYYY-MM-DD}"` so at most one task of each type exists
//! per day.

use chrono::{DateTime, Duration, Utc};
use eyre::Result;
use std::process::Command;

use crate::config::Config;
use crate::domain::{Task, TaskSource, TaskStatus};
use crate::storage::Store;

/// Describes one kind of auto-generated task.
#[derive(Debug, Clone)]
pub struct AutoTaskTemplate {
    pub task_type: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    /// Hours that must pass since the last completion; 0 disables the check
    pub interval_hours: u32,
    /// Minimum commits ahead of main/master; 0 disables the check
    pub min_commits: u32,
    /// Require tracked-file changes within the interval
    pub needs_code_changes: bool,
    /// Require any commits within the interval
    pub needs_new_commits: bool,
}

const fn template(task_type: &'static str, title: &'static str, description: &'static str) -> AutoTaskTemplate {
    AutoTaskTemplate {
        task_type,
        title,
        description,
        interval_hours: 0,
        min_commits: 0,
        needs_code_changes: false,
        needs_new_commits: false,
    }
}

/// Built-in maintenance templates.
pub fn builtin_templates() -> Vec<AutoTaskTemplate> {
    vec![
        AutoTaskTemplate {
            interval_hours: 24,
            needs_new_commits: true,
            ..template(
                "run_tests",
                "Run test suite",
                "Run the full test suite, investigate any failures, and fix broken tests.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 48,
            needs_code_changes: true,
            ..template(
                "update_docs",
                "Update documentation",
                "Review recent code changes and update README or other documentation to stay in sync.",
            )
        },
        AutoTaskTemplate {
            min_commits: 10,
            ..template(
                "clean_commits",
                "Clean up commit history",
                "Review the current branch commits, squash fixups, and improve commit messages.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 12,
            needs_code_changes: true,
            ..template(
                "lint_check",
                "Run linter and fix issues",
                "Run the project linter, auto-fix where possible, and address remaining warnings.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 168,
            ..template(
                "dependency_check",
                "Check dependency updates",
                "Check for outdated dependencies and evaluate available upgrades for security and compatibility.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 168,
            needs_code_changes: true,
            ..template(
                "security_audit",
                "Audit code for security issues",
                "Scan the codebase for security vulnerabilities: hardcoded secrets, SQL injection, XSS, command injection, insecure deserialization, and other OWASP Top 10 risks. Report findings and apply fixes.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 48,
            needs_code_changes: true,
            ..template(
                "test_coverage",
                "Generate tests for uncovered code",
                "Identify functions and branches with no test coverage. Generate unit tests for the most critical uncovered paths. Run the test suite to verify the new tests pass.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 168,
            needs_code_changes: true,
            ..template(
                "dead_code_detection",
                "Detect and remove dead code",
                "Find unused imports, functions, variables, and unreachable code. Remove dead code and verify the test suite still passes.",
            )
        },
        AutoTaskTemplate {
            min_commits: 5,
            ..template(
                "changelog_generation",
                "Generate changelog from recent commits",
                "Review recent commit history and generate or update CHANGELOG entries. Group changes by category (added, changed, fixed, removed) following Keep a Changelog format.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 336,
            needs_code_changes: true,
            ..template(
                "deprecation_cleanup",
                "Clean up deprecated code usage",
                "Find usage of deprecated APIs, functions, and patterns in the codebase. Migrate to recommended alternatives and remove deprecation warnings.",
            )
        },
        AutoTaskTemplate {
            interval_hours: 168,
            needs_code_changes: true,
            ..template(
                "type_coverage",
                "Add type annotations to untyped code",
                "Identify functions and methods missing type annotations. Add type hints for parameters and return values. Run the type checker to verify correctness.",
            )
        },
    ]
}

// --- Git helpers ---

fn git_log_since(path: &str, since: DateTime<Utc>, diff_filter: Option<&str>) -> bool {
    let since_arg = format!("--since={}", since.format("%Y-%m-%dT%H:%M:%S"));
    let mut args = vec!["log", "--oneline"];
    if let Some(filter) = diff_filter {
        args.push(filter);
    }
    args.push(&since_arg);
    args.push("-1");

    let Ok(output) = Command::new("git").args(&args).current_dir(path).output() else {
        return false;
    };
    output.status.success() && !output.stdout.is_empty()
}

fn has_commits_since(path: &str, since: DateTime<Utc>) -> bool {
    git_log_since(path, since, None)
}

fn has_code_changes_since(path: &str, since: DateTime<Utc>) -> bool {
    git_log_since(path, since, Some("--diff-filter=ACMR"))
}

/// Commits on the current branch ahead of main/master.
fn branch_commit_count(path: &str) -> u32 {
    for base in ["main", "master"] {
        let Ok(output) = Command::new("git")
            .args(["rev-list", "--count", &format!("{}..HEAD", base)])
            .current_dir(path)
            .output()
        else {
            continue;
        };
        if output.status.success()
            && let Ok(count) = String::from_utf8_lossy(&output.stdout).trim().parse()
        {
            return count;
        }
    }
    0
}

// --- Condition evaluation ---

/// Most recent completion time for an auto task of this type.
fn last_completed_at(store: &Store, task_type: &str) -> Result<Option<DateTime<Utc>>> {
    let completed = store.tasks_by_status(&[TaskStatus::Completed])?;
    Ok(completed
        .iter()
        .filter(|t| {
            t.source == TaskSource::AutoTask
                && t.source_ref.starts_with(&format!("{}:", task_type))
        })
        .filter_map(|t| t.completed_at)
        .max())
}

fn check_template(
    store: &Store,
    config: &Config,
    template: &AutoTaskTemplate,
    path: &str,
) -> Result<bool> {
    let overrides = config.auto_tasks.templates.get(template.task_type);

    if let Some(o) = overrides
        && o.enabled == Some(false)
    {
        return Ok(false);
    }

    let interval = overrides
        .and_then(|o| o.interval_hours)
        .unwrap_or(template.interval_hours);

    // Time-based check: never completed means eligible
    if interval > 0
        && let Some(last) = last_completed_at(store, template.task_type)?
        && Utc::now() - last < Duration::hours(interval as i64)
    {
        return Ok(false);
    }

    // Commit-count check
    if template.min_commits > 0 {
        let threshold = overrides
            .and_then(|o| o.min_commits)
            .unwrap_or(template.min_commits);
        if branch_commit_count(path) < threshold {
            return Ok(false);
        }
    }

    // Git activity checks within the interval
    if interval > 0 {
        let since = Utc::now() - Duration::hours(interval as i64);
        if template.needs_new_commits && !has_commits_since(path, since) {
            return Ok(false);
        }
        if template.needs_code_changes && !has_code_changes_since(path, since) {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Check all enabled templates and return tasks whose conditions are met.
pub fn scan(store: &Store, config: &Config, path: &str) -> Result<Vec<Task>> {
    if !config.auto_tasks.enabled {
        return Ok(Vec::new());
    }

    let work_dir = if config.auto_tasks.work_dir.is_empty() {
        path
    } else {
        config.auto_tasks.work_dir.as_str()
    };
    let today = Utc::now().format("%Y-%m-%d");

    let mut tasks = Vec::new();
    for template in builtin_templates() {
        if !check_template(store, config, &template, work_dir)? {
            continue;
        }
        tasks.push(Task::new(
            template.title,
            template.description,
            TaskSource::AutoTask,
            &format!("{}:{}", template.task_type, today),
        ));
    }

    Ok(tasks)
}
