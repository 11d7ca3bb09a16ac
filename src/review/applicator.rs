//! Merge/reject execution for reviewed tasks.

use eyre::Result;

use crate::domain::{Task, TaskStatus};
use crate::error::NightshiftError;
use crate::storage::Store;
use crate::worker::sandbox::{current_branch, delete_branch, merge_branch};

fn completed_task(store: &Store, task_id: i64) -> Result<Task> {
    let task = store
        .get_task(task_id)?
        .ok_or(NightshiftError::TaskNotFound(task_id))?;

    if task.status != TaskStatus::Completed {
        return Err(NightshiftError::InvalidState(format!(
            "task #{} is not completed (status: {})",
            task_id, task.status
        ))
        .into());
    }

    Ok(task)
}

/// Approve a completed task: merge its work branch into the current branch
/// and delete the branch.
pub fn approve_task(store: &Store, task_id: i64) -> Result<Task> {
    let task = completed_task(store, task_id)?;

    if task.work_branch.is_empty() {
        return Err(NightshiftError::InvalidState(format!(
            "task #{} has no work branch to merge",
            task_id
        ))
        .into());
    }
    if task.work_dir.is_empty() {
        return Err(NightshiftError::InvalidState(format!(
            "task #{} has no work directory recorded",
            task_id
        ))
        .into());
    }

    let target = current_branch(&task.work_dir)?;
    tracing::info!(task_id, branch = %task.work_branch, target = %target, "Merging approved work");
    merge_branch(&task.work_dir, &task.work_branch, &target)?;

    // The branch is merged; deleting it is best-effort
    if let Err(e) = delete_branch(&task.work_dir, &task.work_branch) {
        tracing::warn!(error = %e, branch = %task.work_branch, "Could not delete merged branch");
    }

    Ok(task)
}

/// Reject a completed task: delete its work branch and mark it cancelled.
pub fn reject_task(store: &Store, task_id: i64) -> Result<Task> {
    let mut task = completed_task(store, task_id)?;

    if !task.work_branch.is_empty() && !task.work_dir.is_empty() {
        if let Err(e) = delete_branch(&task.work_dir, &task.work_branch) {
            tracing::warn!(error = %e, branch = %task.work_branch, "Could not delete rejected branch");
        }
    }

    task.status = TaskStatus::Cancelled;
    store.update_task(&task)?;
    tracing::info!(task_id, "Task rejected");
    Ok(task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use std::process::Command;
    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
        ] {
            Command::new("git").args(&args).current_dir(dir).output().unwrap();
        }
        fs::write(dir.join("file.txt"), "initial").unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "initial"])
            .current_dir(dir)
            .output()
            .unwrap();
    }

    fn completed_task_with_branch(store: &Store, repo: &Path) -> Task {
        use crate::worker::sandbox::{cleanup_sandbox, create_sandbox};

        let mut task = Task::manual("reviewed work", "");
        task.status = TaskStatus::Completed;
        task.work_dir = repo.to_str().unwrap().to_string();
        task.id = store.insert_task(&task).unwrap();

        let ctx = create_sandbox(task.id, &task.title, repo.to_str().unwrap()).unwrap();
        fs::write(repo.join("work.txt"), "autonomous change").unwrap();
        Command::new("git").args(["add", "."]).current_dir(repo).output().unwrap();
        Command::new("git")
            .args(["commit", "-m", "autonomous work"])
            .current_dir(repo)
            .output()
            .unwrap();
        cleanup_sandbox(&ctx, true).unwrap();

        task.work_branch = ctx.branch_name;
        store.update_task(&task).unwrap();
        task
    }

    #[test]
    fn test_approve_non_completed_fails() {
        let (store, _temp) = create_temp_store();
        let task = Task::manual("pending", "");
        let id = store.insert_task(&task).unwrap();

        assert!(approve_task(&store, id).is_err());
    }

    #[test]
    fn test_approve_without_branch_fails() {
        let (store, _temp) = create_temp_store();
        let mut task = Task::manual("no branch", "");
        task.status = TaskStatus::Completed;
        let id = store.insert_task(&task).unwrap();

        assert!(approve_task(&store, id).is_err());
    }

    #[test]
    fn test_approve_merges_work() {
        let (store, _temp) = create_temp_store();
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());

        let task = completed_task_with_branch(&store, repo.path());
        approve_task(&store, task.id).unwrap();

        // The work landed on main and the branch is gone
        assert!(repo.path().join("work.txt").exists());
        let branches = Command::new("git")
            .args(["branch", "--list", &task.work_branch])
            .current_dir(repo.path())
            .output()
            .unwrap();
        assert!(String::from_utf8_lossy(&branches.stdout).trim().is_empty());
    }

    #[test]
    fn test_reject_cancels_and_deletes_branch() {
        let (store, _temp) = create_temp_store();
        let repo = TempDir::new().unwrap();
        init_repo(repo.path());

        let task = completed_task_with_branch(&store, repo.path());
        reject_task(&store, task.id).unwrap();

        let updated = store.get_task(task.id).unwrap().unwrap();
        assert_eq!(updated.status, TaskStatus::Cancelled);
        assert!(!repo.path().join("work.txt").exists());
    }

    #[test]
    fn test_reject_missing_task_fails() {
        let (store, _temp) = create_temp_store();
        assert!(reject_task(&store, 404).is_err());
    }
}
