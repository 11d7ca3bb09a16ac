//! Task priority scoring.
//!
//! Scores are a static heuristic in [0, 100]: source weight + keyword
//! bonuses + a simplicity bonus for short descriptions. Ties and near-ties
//! are expected; the queue breaks them by creation time.

use eyre::Result;
use regex::Regex;
use std::sync::LazyLock;

use crate::domain::{Task, TaskSource, TaskStatus};
use crate::storage::Store;

/// Keyword rules applied to title + description. Each is (pattern, bonus).
static KEYWORD_RULES: LazyLock<Vec<(Regex, f64)>> = LazyLock::new(|| {
    vec![
        (Regex::new(r"(?i)\b(bug|fix|crash|error|broken)\b").unwrap(), 25.0),
        (Regex::new(r"(?i)\b(security|vulnerability|vuln|cve)\b").unwrap(), 30.0),
        (Regex::new(r"(?i)\b(refactor|cleanup|clean[- ]?up)\b").unwrap(), 10.0),
        (Regex::new(r"(?i)\b(doc|docs|documentation|readme)\b").unwrap(), 5.0),
        (Regex::new(r"(?i)\b(test|tests|testing)\b").unwrap(), 8.0),
        (Regex::new(r"(?i)\b(perf|performance|slow)\b").unwrap(), 15.0),
        (Regex::new(r"\bFIXME\b").unwrap(), 20.0),
        (Regex::new(r"\bHACK\b").unwrap(), 15.0),
        (Regex::new(r"\bXXX\b").unwrap(), 15.0),
    ]
});

/// Maximum simplicity bonus for very short tasks.
const MAX_SIMPLICITY_BONUS: f64 = 15.0;
/// Combined title+description length past which no simplicity bonus applies.
const SIMPLICITY_CHAR_THRESHOLD: usize = 200;

fn source_weight(source: TaskSource) -> f64 {
    match source {
        TaskSource::Manual => 40.0,
        TaskSource::QueueFile => 35.0,
        TaskSource::Issue => 30.0,
        TaskSource::TodoComment => 20.0,
        TaskSource::AutoTask => 15.0,
    }
}

/// Return a priority score in [0, 100] for the task.
///
/// Components:
/// 1. Source weight: manual tasks score highest, generated maintenance lowest.
/// 2. Keyword bonuses: bug/security/perf keywords outrank docs/cleanup ones.
/// 3. Simplicity bonus: shorter tasks are better autonomous candidates and
///    get up to +15, scaled linearly down to zero at the length threshold.
pub fn calculate_priority(task: &Task) -> f64 {
    let mut score = source_weight(task.source);

    let text = format!("{} {}", task.title, task.description);
    for (pattern, bonus) in KEYWORD_RULES.iter() {
        if pattern.is_match(&text) {
            score += bonus;
        }
    }

    let len = task.title.len() + task.description.len();
    if len < SIMPLICITY_CHAR_THRESHOLD {
        let ratio = 1.0 - (len as f64 / SIMPLICITY_CHAR_THRESHOLD as f64);
        score += MAX_SIMPLICITY_BONUS * ratio;
    }

    score.clamp(0.0, 100.0)
}

/// Recalculate and persist priorities for every pending task.
///
/// Returns the number of tasks rescored.
pub fn reprioritize_all(store: &Store) -> Result<usize> {
    let tasks = store.tasks_by_status(&[TaskStatus::Pending])?;
    let count = tasks.len();
    for mut task in tasks {
        task.priority = calculate_priority(&task);
        store.update_task(&task)?;
    }
    Ok(count)
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

    fn task_with(title: &str, description: &str, source: TaskSource) -> Task {
        Task::new(title, description, source, "ref")
    }

    #[test]
    fn test_score_in_range() {
        let tasks = [
            task_with("x", "", TaskSource::Manual),
            task_with(
                "security vulnerability bug crash FIXME HACK XXX perf test",
                "",
                TaskSource::Manual,
            ),
            task_with(&"long ".repeat(100), &"text ".repeat(200), TaskSource::AutoTask),
        ];
        for task in &tasks {
            let score = calculate_priority(task);
            assert!((0.0..=100.0).contains(&score), "score={}", score);
        }
    }

    #[test]
    fn test_manual_outranks_auto_task() {
        let manual = task_with("same text", "", TaskSource::Manual);
        let auto = task_with("same text", "", TaskSource::AutoTask);
        assert!(calculate_priority(&manual) > calculate_priority(&auto));
    }

    #[test]
    fn test_bug_keywords_boost() {
        let plain = task_with("update the readme styling", "", TaskSource::Manual);
        let bug = task_with("fix crash in parser", "", TaskSource::Manual);
        assert!(calculate_priority(&bug) > calculate_priority(&plain));
    }

    #[test]
    fn test_security_beats_docs() {
        let docs = task_with("improve documentation", "", TaskSource::Manual);
        let security = task_with("patch security vulnerability", "", TaskSource::Manual);
        assert!(calculate_priority(&security) > calculate_priority(&docs));
    }

    #[test]
    fn test_fixme_is_case_sensitive() {
        let upper = task_with("FIXME parser drops tokens", "", TaskSource::TodoComment);
        let lower = task_with("fixme parser drops tokens", "", TaskSource::TodoComment);
        assert!(calculate_priority(&upper) > calculate_priority(&lower));
    }

    #[test]
    fn test_short_task_gets_simplicity_bonus() {
        let short = task_with("rename var", "", TaskSource::Manual);
        let long = task_with("rename var", &"context ".repeat(40), TaskSource::Manual);
        assert!(calculate_priority(&short) > calculate_priority(&long));
    }

    #[test]
    fn test_long_task_no_simplicity_bonus() {
        // At exactly the threshold the bonus is zero
        let text = "a".repeat(SIMPLICITY_CHAR_THRESHOLD);
        let task = task_with(&text, "", TaskSource::Manual);
        assert!((calculate_priority(&task) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_reprioritize_all_persists() {
        let (store, _temp) = create_temp_store();

        let task = Task::manual("fix crash in login", "");
        let id = store.insert_task(&task).unwrap();

        let count = reprioritize_all(&store).unwrap();
        assert_eq!(count, 1);

        let updated = store.get_task(id).unwrap().unwrap();
        assert!(updated.priority > 0.0);
    }

    #[test]
    fn test_reprioritize_skips_running() {
        let (store, _temp) = create_temp_store();

        let mut running = Task::manual("running task", "");
        running.status = TaskStatus::Running;
        running.priority = 99.0;
        let id = store.insert_task(&running).unwrap();

        reprioritize_all(&store).unwrap();

        // Running tasks keep their frozen priority
        let unchanged = store.get_task(id).unwrap().unwrap();
        assert!((unchanged.priority - 99.0).abs() < 1e-9);
    }
}
