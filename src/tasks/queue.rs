//! Task queue management: add, scan, remove, and head selection.

use eyre::Result;

use crate::config::Config;
use crate::domain::{Task, TaskSource, TaskStatus};
use crate::error::NightshiftError;
use crate::storage::Store;
use crate::tasks::prioritizer::{calculate_priority, reprioritize_all};
use crate::tasks::sources;

/// Create a new manual task. A zero priority means "score it for me".
pub fn add_task(
    store: &Store,
    title: &str,
    description: &str,
    priority: f64,
    tier: Option<crate::domain::ModelTier>,
) -> Result<Task> {
    let mut task = Task::manual(title, description);
    task.tier = tier;
    task.priority = if priority == 0.0 {
        calculate_priority(&task)
    } else {
        priority
    };
    task.id = store.insert_task(&task)?;
    tracing::info!(id = task.id, title = %task.title, priority = task.priority, "Added task");
    Ok(task)
}

/// Run all source scanners over `path`, insert new tasks, and reprioritize.
///
/// Candidates whose `(source, source_ref)` pair already exists are skipped,
/// so scanning the same tree twice never duplicates work items.
/// Returns the number of newly inserted tasks.
pub fn scan_tasks(store: &Store, config: &Config, path: &str) -> Result<usize> {
    let mut found: Vec<Task> = Vec::new();
    found.extend(sources::todo_scan::scan(path));
    found.extend(sources::queue_file::scan(path));
    found.extend(sources::auto_tasks::scan(store, config, path)?);

    tracing::info!(candidates = found.len(), path = %path, "Scan complete");

    let existing: std::collections::HashSet<(TaskSource, String)> = store
        .all_tasks()?
        .iter()
        .map(|t| t.dedup_key())
        .collect();

    let mut seen = existing;
    let mut inserted = 0;
    for mut task in found {
        let key = task.dedup_key();
        if seen.contains(&key) {
            continue;
        }
        task.priority = calculate_priority(&task);
        task.id = store.insert_task(&task)?;
        seen.insert(key);
        inserted += 1;
    }

    // Rescore everything so relative order stays consistent
    reprioritize_all(store)?;

    Ok(inserted)
}

/// Delete a task. Removing a running task is an invariant violation and
/// fails without deleting anything.
pub fn remove_task(store: &Store, id: i64) -> Result<Task> {
    let task = store
        .get_task(id)?
        .ok_or(NightshiftError::TaskNotFound(id))?;

    if task.status == TaskStatus::Running {
        return Err(NightshiftError::InvalidState(format!(
            "task #{} is currently running and cannot be removed",
            id
        ))
        .into());
    }

    store.delete_task(id)?;
    tracing::info!(id, title = %task.title, "Removed task");
    Ok(task)
}

/// The highest-priority pending task, or None.
///
/// Storage orders by priority descending with creation time as tiebreaker.
pub fn next_task(store: &Store) -> Result<Option<Task>> {
    let mut pending = store.tasks_by_status(&[TaskStatus::Pending])?;
    if pending.is_empty() {
        Ok(None)
    } else {
        Ok(Some(pending.remove(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_temp_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open_at(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[test]
    fn test_add_task_scores_when_unset() {
        let (store, _temp) = create_temp_store();
        let task = add_task(&store, "fix crash on startup", "", 0.0, None).unwrap();
        assert!(task.priority > 0.0);
        assert!(task.id > 0);
    }

    #[test]
    fn test_add_task_explicit_priority() {
        let (store, _temp) = create_temp_store();
        let task = add_task(&store, "whatever", "", 77.0, None).unwrap();
        assert!((task.priority - 77.0).abs() < 1e-9);
    }

    #[test]
    fn test_remove_pending_task() {
        let (store, _temp) = create_temp_store();
        let task = add_task(&store, "to remove", "", 0.0, None).unwrap();

        let removed = remove_task(&store, task.id).unwrap();
        assert_eq!(removed.id, task.id);
        assert!(store.get_task(task.id).unwrap().is_none());
    }

    #[test]
    fn test_remove_running_task_fails() {
        let (store, _temp) = create_temp_store();
        let task = add_task(&store, "busy", "", 0.0, None).unwrap();
        store.claim_task(task.id, crate::domain::ModelTier::Sonnet).unwrap();

        let result = remove_task(&store, task.id);
        assert!(result.is_err());
        // Task is still there
        assert!(store.get_task(task.id).unwrap().is_some());
    }

    #[test]
    fn test_remove_missing_task_fails() {
        let (store, _temp) = create_temp_store();
        assert!(remove_task(&store, 404).is_err());
    }

    #[test]
    fn test_next_task_priority_order() {
        let (store, _temp) = create_temp_store();
        add_task(&store, "low", "", 10.0, None).unwrap();
        let high = add_task(&store, "high", "", 90.0, None).unwrap();

        let head = next_task(&store).unwrap().unwrap();
        assert_eq!(head.id, high.id);

        remove_task(&store, high.id).unwrap();
        let head = next_task(&store).unwrap().unwrap();
        assert_eq!(head.title, "low");
    }

    #[test]
    fn test_next_task_empty_queue() {
        let (store, _temp) = create_temp_store();
        assert!(next_task(&store).unwrap().is_none());
    }

    #[test]
    fn test_scan_dedups_on_second_pass() {
        let (store, store_dir) = create_temp_store();
        let config = Config::default();

        let repo = TempDir::new().unwrap();
        fs::write(
            repo.path().join(".nightshift-tasks"),
            "- [ ] First queued task\n- [ ] Second queued task\n",
        )
        .unwrap();

        let first = scan_tasks(&store, &config, repo.path().to_str().unwrap()).unwrap();
        assert_eq!(first, 2);

        let second = scan_tasks(&store, &config, repo.path().to_str().unwrap()).unwrap();
        assert_eq!(second, 0);

        assert_eq!(store.all_tasks().unwrap().len(), 2);
        drop(store_dir);
    }
}
