//! Work summaries for the review queue.

use eyre::Result;

use crate::domain::{Task, TaskStatus};
use crate::error::NightshiftError;
use crate::storage::Store;
use crate::worker::sandbox::{branch_diff, branch_log};

/// Completed tasks awaiting review, highest priority first.
pub fn reviewable_tasks(store: &Store) -> Result<Vec<Task>> {
    store.tasks_by_status(&[TaskStatus::Completed])
}

/// Everything the reviewer needs to judge one task.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDetail {
    pub task: Task,
    /// Commit log of the work branch relative to the current branch
    pub log: Option<String>,
    /// Diff of the work branch relative to the current branch
    pub diff: Option<String>,
}

/// Gather the task, its branch log, and its diff for display.
///
/// Branch inspection failures are reported as None rather than errors so
/// a deleted branch still leaves the summary readable.
pub fn review_detail(store: &Store, task_id: i64) -> Result<ReviewDetail> {
    let task = store
        .get_task(task_id)?
        .ok_or(NightshiftError::TaskNotFound(task_id))?;

    let (log, diff) = if !task.work_branch.is_empty() && !task.work_dir.is_empty() {
        let log = branch_log(&task.work_dir, &task.work_branch, "HEAD").ok();
        let diff = branch_diff(&task.work_dir, &task.work_branch, "HEAD").ok();
        (log, diff)
    } else {
        (None, None)
    };

    Ok(ReviewDetail { task, log, diff })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_reviewable_only_completed() {
        let (store, _temp) = create_temp_store();

        let mut completed = Task::manual("done", "");
        completed.status = TaskStatus::Completed;
        store.insert_task(&completed).unwrap();

        store.insert_task(&Task::manual("still pending", "")).unwrap();

        let reviewable = reviewable_tasks(&store).unwrap();
        assert_eq!(reviewable.len(), 1);
        assert_eq!(reviewable[0].title, "done");
    }

    #[test]
    fn test_review_detail_missing_task() {
        let (store, _temp) = create_temp_store();
        assert!(review_detail(&store, 404).is_err());
    }

    #[test]
    fn test_review_detail_without_branch() {
        let (store, _temp) = create_temp_store();

        let mut task = Task::manual("no branch", "");
        task.status = TaskStatus::Completed;
        task.id = store.insert_task(&task).unwrap();

        let detail = review_detail(&store, task.id).unwrap();
        assert!(detail.log.is_none());
        assert!(detail.diff.is_none());
    }
}
