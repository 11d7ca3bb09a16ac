//! Task records and their lifecycle state machine.
//!
//! A task moves pending -> running -> {completed, failed, cancelled} and
//! never returns to pending. The `(source, source_ref)` pair deduplicates
//! ingestion: scanning the same source twice must not insert twins.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ModelTier;

/// One unit of autonomous work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Database id (0 until inserted)
    pub id: i64,

    /// Short imperative summary
    pub title: String,

    /// Free-text detail handed to the agent
    pub description: String,

    /// Where this task came from
    pub source: TaskSource,

    /// Unique-per-source origin reference, e.g. "src/db.rs:42" or "lint_check:2026-08-07"
    pub source_ref: String,

    /// Lifecycle state
    pub status: TaskStatus,

    /// Priority score in [0, 100]
    pub priority: f64,

    /// Explicit tier override; None means the selector decides
    pub tier: Option<ModelTier>,

    /// Isolation branch name, set once execution starts
    pub work_branch: String,

    /// Repository the task operates on; empty means the daemon's cwd
    pub work_dir: String,

    /// Agent output (success) or error text (failure), truncated
    pub result_summary: String,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new pending task from the given source.
    pub fn new(title: &str, description: &str, source: TaskSource, source_ref: &str) -> Self {
        Self {
            id: 0,
            title: title.to_string(),
            description: description.to_string(),
            source,
            source_ref: source_ref.to_string(),
            status: TaskStatus::Pending,
            priority: 0.0,
            tier: None,
            work_branch: String::new(),
            work_dir: String::new(),
            result_summary: String::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Create a manually entered task.
    pub fn manual(title: &str, description: &str) -> Self {
        Self::new(title, description, TaskSource::Manual, "")
    }

    /// Dedup key for ingestion.
    pub fn dedup_key(&self) -> (TaskSource, String) {
        (self.source, self.source_ref.clone())
    }
}

/// Task origin discriminator (closed set).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskSource {
    /// Entered via the CLI
    Manual,
    /// Scanned TODO/FIXME/HACK/XXX comment
    TodoComment,
    /// Markdown queue-file checkbox
    QueueFile,
    /// Issue tracker import
    Issue,
    /// Generated maintenance template
    AutoTask,
}

impl TaskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskSource::Manual => "manual",
            TaskSource::TodoComment => "todo_comment",
            TaskSource::QueueFile => "queue_file",
            TaskSource::Issue => "issue",
            TaskSource::AutoTask => "auto_task",
        }
    }

    pub fn parse(s: &str) -> Option<TaskSource> {
        match s {
            "manual" => Some(TaskSource::Manual),
            "todo_comment" => Some(TaskSource::TodoComment),
            "queue_file" => Some(TaskSource::QueueFile),
            "issue" => Some(TaskSource::Issue),
            "auto_task" => Some(TaskSource::AutoTask),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task lifecycle state machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting in the queue
    Pending,
    /// Claimed by the daemon, agent in flight
    Running,
    /// Agent finished successfully; branch kept for review
    Completed,
    /// Agent failed, timed out, or raised
    Failed,
    /// Removed or rejected by the operator
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check if this task can be started.
    pub fn can_start(&self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
