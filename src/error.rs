//! Error types for Nightshift
//!
//! Centralized error handling using thiserror. These variants cover the
//! invariant violations rejected at the API boundary; plumbing errors are
//! carried as eyre reports with context.

use thiserror::Error;

/// All error types that can occur in Nightshift
#[derive(Debug, Error)]
pub enum NightshiftError {
    /// Task not found in storage
    #[error("Task not found: #{0}")]
    TaskNotFound(i64),

    /// Invalid state transition or operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Git sandbox error
    #[error("Sandbox error: {0}")]
    Sandbox(String),

    /// Agent CLI execution error
    #[error("Agent error: {0}")]
    Agent(String),

    /// Storage/persistence error
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for Nightshift operations
pub type Result<T> = std::result::Result<T, NightshiftError>;
