//! Branch isolation for autonomous task execution.
//!
//! Each running task gets an exclusive branch created from a clean HEAD.
//! The branch survives execution for human review; only the checkout is
//! restored afterwards.

use crate::error::{NightshiftError, Result};
use std::path::Path;
use std::process::Command;

/// Context for an isolated task execution environment.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxContext {
    pub task_id: i64,
    pub repo_path: String,
    pub branch_name: String,
    pub original_branch: String,
}

fn run_git(args: &[&str], cwd: &str) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|e| NightshiftError::Sandbox(format!("Failed to execute git: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(NightshiftError::Sandbox(format!(
            "git {} failed: {}",
            args.first().unwrap_or(&""),
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Convert a task title to a valid branch name segment.
fn sanitize_branch_name(name: &str) -> String {
    let mut safe: String = name
        .to_lowercase()
        .trim()
        .replace(' ', "-")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '/'))
        .collect();

    while safe.contains("--") {
        safe = safe.replace("--", "-");
    }

    safe.trim_matches('-').chars().take(50).collect()
}

/// The currently checked-out branch.
pub fn current_branch(repo_path: &str) -> Result<String> {
    Ok(run_git(&["rev-parse", "--abbrev-ref", "HEAD"], repo_path)?
        .trim()
        .to_string())
}

/// Check if the repo has uncommitted changes.
pub fn has_uncommitted_changes(repo_path: &str) -> Result<bool> {
    Ok(!run_git(&["status", "--porcelain"], repo_path)?.trim().is_empty())
}

/// Create an isolated branch for task execution.
///
/// Branches from the current HEAD and checks it out. Refuses to touch a
/// repository with uncommitted changes.
pub fn create_sandbox(task_id: i64, task_title: &str, repo_path: &str) -> Result<SandboxContext> {
    if !Path::new(repo_path).join(".git").exists() {
        return Err(NightshiftError::Sandbox(format!(
            "Not a git repository: {}",
            repo_path
        )));
    }

    if has_uncommitted_changes(repo_path)? {
        return Err(NightshiftError::Sandbox(format!(
            "Repository has uncommitted changes: {}. Commit or stash before running autonomous tasks.",
            repo_path
        )));
    }

    let original_branch = current_branch(repo_path)?;
    let mut branch_name = format!("nightshift/{}", sanitize_branch_name(task_title));

    // Suffix with the task id if the branch already exists
    let existing = run_git(&["branch", "--list", &branch_name], repo_path)?;
    if !existing.trim().is_empty() {
        branch_name = format!("{}-{}", branch_name, task_id);
    }

    run_git(&["checkout", "-b", &branch_name], repo_path)?;

    Ok(SandboxContext {
        task_id,
        repo_path: repo_path.to_string(),
        branch_name,
        original_branch,
    })
}

/// Switch back to the original branch.
///
/// The work branch is kept by default so completed work can be reviewed;
/// pass `keep_branch = false` to delete it.
pub fn cleanup_sandbox(ctx: &SandboxContext, keep_branch: bool) -> Result<()> {
    run_git(&["checkout", &ctx.original_branch], &ctx.repo_path)?;
    if !keep_branch {
        run_git(&["branch", "-D", &ctx.branch_name], &ctx.repo_path)?;
    }
    Ok(())
}

/// Diff between a work branch and the base branch.
pub fn branch_diff(repo_path: &str, branch_name: &str, base_branch: &str) -> Result<String> {
    run_git(
        &["diff", &format!("{}...{}", base_branch, branch_name)],
        repo_path,
    )
}

/// Commit log for a work branch since it diverged from base.
pub fn branch_log(repo_path: &str, branch_name: &str, base_branch: &str) -> Result<String> {
    run_git(
        &["log", "--oneline", &format!("{}..{}", base_branch, branch_name)],
        repo_path,
    )
}

/// Merge a work branch into the target branch.
///
/// On conflict the merge is aborted and the previous checkout restored
/// before the error propagates.
pub fn merge_branch(repo_path: &str, branch_name: &str, target_branch: &str) -> Result<()> {
    let previous = current_branch(repo_path)?;
    run_git(&["checkout", target_branch], repo_path)?;

    let message = format!("Merge nightshift work: {}", branch_name);
    if let Err(e) = run_git(&["merge", "--no-ff", branch_name, "-m", &message], repo_path) {
        let _ = run_git(&["merge", "--abort"], repo_path);
        let _ = run_git(&["checkout", &previous], repo_path);
        return Err(e);
    }

    Ok(())
}

/// Delete a work branch.
pub fn delete_branch(repo_path: &str, branch_name: &str) -> Result<()> {
    run_git(&["branch", "-D", branch_name], repo_path)?;
    Ok(())
}
