//! Scan git-tracked files for TODO/FIXME/HACK/XXX comments.

use regex::Regex;
use std::path::Path;
use std::process::Command;
use std::sync::LazyLock;

use crate::domain::{Task, TaskSource};

/// Comment leader followed by a marker keyword and trailing text.
static TODO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:#|//|/\*|\*|--|;)\s*(?i)(TODO|FIXME|HACK|XXX)[\s:(\-]*(.+?)$").unwrap()
});

/// Directory names that are considered test directories.
const TEST_DIRS: [&str; 4] = ["tests", "test", "spec", "__tests__"];

/// Filename markers that indicate test files.
fn is_test_file(rel_path: &str) -> bool {
    let path = Path::new(rel_path);
    let components: Vec<&str> = path
        .iter()
        .filter_map(|c| c.to_str())
        .collect();

    // Any parent directory component matches a test directory name
    if components.len() > 1
        && components[..components.len() - 1]
            .iter()
            .any(|part| TEST_DIRS.contains(part))
    {
        return true;
    }

    let name = components.last().copied().unwrap_or("");
    name.starts_with("test_")
        || name.ends_with("_test.py")
        || name.ends_with("_spec.py")
        || name == "conftest.py"
        || name.ends_with(".test.js")
        || name.ends_with(".test.ts")
        || name.ends_with(".spec.js")
        || name.ends_with(".spec.ts")
}

/// Tracked non-test files via `git ls-files`.
fn git_tracked_files(path: &str) -> Vec<String> {
    let Ok(output) = Command::new("git").arg("ls-files").current_dir(path).output() else {
        return Vec::new();
    };
    if !output.status.success() {
        return Vec::new();
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|f| !f.trim().is_empty() && !is_test_file(f))
        .map(String::from)
        .collect()
}

/// Walk tracked files under `path` and collect TODO-style comments.
///
/// Each hit becomes a task titled `"[KEYWORD] body"` with `source_ref`
/// `"<relative-file>:<line-number>"`.
pub fn scan(path: &str) -> Vec<Task> {
    let root = Path::new(path);
    let tracked = git_tracked_files(path);

    let mut tasks = Vec::new();
    for rel_path in tracked {
        let file_path = root.join(&rel_path);
        if !file_path.is_file() {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(&file_path) else {
            continue;
        };

        for (lineno, line) in content.lines().enumerate() {
            let Some(captures) = TODO_RE.captures(line) else {
                continue;
            };
            let keyword = captures[1].to_uppercase();
            let body = captures[2].trim().trim_end_matches("*/").trim();
            if body.is_empty() {
                continue;
            }

            tasks.push(Task::new(
                &format!("[{}] {}", keyword, body),
                "",
                TaskSource::TodoComment,
                &format!("{}:{}", rel_path, lineno + 1),
            ));
        }
    }

    tasks
}
