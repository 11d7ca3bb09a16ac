//! Operator activity detection.
//!
//! Detects whether the operator is actively using the agent CLI by looking
//! for running processes, and records activity sessions for the schedule
//! learner.

use chrono::Utc;
use eyre::Result;
use std::process::Command;

use crate::domain::ActivitySession;
use crate::storage::Store;

/// Check if the operator is currently using the agent CLI.
///
/// Returns true if any `claude` process is found running.
pub fn is_user_active() -> bool {
    match Command::new("pgrep").args(["-f", "claude"]).output() {
        Ok(output) => output.status.success() && !output.stdout.is_empty(),
        Err(_) => false,
    }
}

/// Minutes since the last detected activity.
///
/// Looks at the most recent session's end time. Returns `f64::INFINITY`
/// when no sessions have been recorded.
pub fn idle_minutes(store: &Store) -> Result<f64> {
    let sessions = store.recent_sessions(1)?;
    let Some(last) = sessions.first() else {
        return Ok(f64::INFINITY);
    };

    let reference = last.end_time.unwrap_or(last.start_time);
    let minutes = (Utc::now() - reference).num_seconds() as f64 / 60.0;
    Ok(minutes.max(0.0))
}

/// Tracks the currently open activity session.
///
/// Owned by the daemon instance rather than hidden in process-wide state,
/// so independent daemons (and tests) do not interfere.
#[derive(Debug, Default)]
pub struct ActivityTracker {
    current_session_id: Option<i64>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current activity state.
    ///
    /// Opens a session when activity starts, keeps it alive while activity
    /// continues, and closes it when activity stops.
    pub fn record(&mut self, store: &Store) -> Result<()> {
        self.record_state(store, is_user_active())
    }

    /// Same as `record`, with the activity flag injected (tests).
    pub fn record_state(&mut self, store: &Store, active: bool) -> Result<()> {
        let now = Utc::now();

        match (active, self.current_session_id) {
            (true, None) => {
                let session = ActivitySession {
                    id: 0,
                    start_time: now,
                    end_time: None,
                    message_count: 0,
                };
                self.current_session_id = Some(store.insert_session(&session)?);
            }
            (true, Some(id)) => {
                if let Some(mut session) = store
                    .recent_sessions(1)?
                    .into_iter()
                    .find(|s| s.id == id)
                {
                    session.end_time = Some(now);
                    session.message_count += 1;
                    store.update_session(&session)?;
                }
            }
            (false, Some(id)) => {
                if let Some(mut session) = store
                    .recent_sessions(1)?
                    .into_iter()
                    .find(|s| s.id == id)
                {
                    session.end_time = Some(now);
                    store.update_session(&session)?;
                }
                self.current_session_id = None;
            }
            (false, None) => {}
        }

        Ok(())
    }
}
