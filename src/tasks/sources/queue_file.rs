//! Read tasks from a queue file (`.nightshift-tasks` or `nightshift-tasks.md`).

use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::domain::{Task, TaskSource};

/// Matches markdown-style unchecked task list items:  - [ ] Some task text
static TASK_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-\s*\[\s*\]\s+(.+)$").unwrap());

const QUEUE_FILENAMES: [&str; 2] = [".nightshift-tasks", "nightshift-tasks.md"];

fn find_queue_file(path: &str) -> Option<PathBuf> {
    let root = Path::new(path);
    QUEUE_FILENAMES
        .iter()
        .map(|name| root.join(name))
        .find(|candidate| candidate.is_file())
}

/// Parse a markdown task-list queue file under `path`.
///
/// Lines matching `- [ ] <text>` become tasks with `source_ref` set to
/// `"<filename>:<line-number>"`.
pub fn scan(path: &str) -> Vec<Task> {
    let Some(queue_file) = find_queue_file(path) else {
        return Vec::new();
    };

    let Ok(content) = std::fs::read_to_string(&queue_file) else {
        return Vec::new();
    };

    let file_name = queue_file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let mut tasks = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let Some(captures) = TASK_LINE_RE.captures(line.trim()) else {
            continue;
        };
        let title = captures[1].trim();
        if title.is_empty() {
            continue;
        }
        tasks.push(Task::new(
            title,
            "",
            TaskSource::QueueFile,
            &format!("{}:{}", file_name, lineno + 1),
        ));
    }

    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_no_queue_file() {
        let dir = TempDir::new().unwrap();
        assert!(scan(dir.path().to_str().unwrap()).is_empty());
    }

    #[test]
    fn test_scan_unchecked_items() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(".nightshift-tasks"),
            "# Queue\n- [ ] Add retry logic\n- [x] Already done\n- [ ] Tidy imports\nnot a task\n",
        )
        .unwrap();

        let tasks = scan(dir.path().to_str().unwrap());
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].title, "Add retry logic");
        assert_eq!(tasks[0].source, TaskSource::QueueFile);
        assert_eq!(tasks[0].source_ref, ".nightshift-tasks:2");
        assert_eq!(tasks[1].title, "Tidy imports");
    }

    #[test]
    fn test_scan_markdown_variant() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("nightshift-tasks.md"), "- [ ] One item\n").unwrap();

        let tasks = scan(dir.path().to_str().unwrap());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].source_ref, "nightshift-tasks.md:1");
    }

    #[test]
    fn test_dotfile_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".nightshift-tasks"), "- [ ] From dotfile\n").unwrap();
        fs::write(dir.path().join("nightshift-tasks.md"), "- [ ] From markdown\n").unwrap();

        let tasks = scan(dir.path().to_str().unwrap());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "From dotfile");
    }

    #[test]
    fn test_empty_titles_skipped() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".nightshift-tasks"), "- [ ]    \n").unwrap();
        assert!(scan(dir.path().to_str().unwrap()).is_empty());
    }
}
