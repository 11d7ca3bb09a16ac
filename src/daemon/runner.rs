//! The daemon's polling control loop.
//!
//! Each tick: reap finished tasks, record activity, refresh the weekly
//! budget on its cadence, ask the admission scheduler whether to start
//! something, and spawn the head of the queue if so. Admitted tasks run as
//! independent tokio tasks; the pending->running transition is a storage
//! CAS, so a concurrent tick can never double-admit.
//!
//! Shutdown is observed at the poll boundary: in-flight executions are not
//! aborted, they drain to their own timeouts.

use chrono::Utc;
use eyre::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::domain::{Task, TaskStatus};
use crate::patterns::activity::ActivityTracker;
use crate::quota::usage_api::fetch_usage;
use crate::quota::weekly::{WeeklyBudget, hours_until_weekly_reset};
use crate::quota::{corrections, estimator};
use crate::scheduler::admission::decide;
use crate::storage::Store;
use crate::tasks::model_select::select_tier;
use crate::tasks::queue::next_task;
use crate::worker::executor::execute_task;
use crate::worker::monitor::task_budget;
use crate::worker::sandbox::{SandboxContext, cleanup_sandbox, create_sandbox};

/// Result summaries are truncated to this length before persisting.
const RESULT_SUMMARY_MAX: usize = 2000;

/// Event sent from a finished task back to the daemon.
#[derive(Debug)]
pub enum TaskEvent {
    Finished { task_id: i64, success: bool },
}

/// The daemon: owns the store, the weekly budget state, the activity
/// tracker, and the running-task map.
pub struct Daemon {
    config: Config,
    store: Arc<Mutex<Store>>,
    weekly: WeeklyBudget,
    activity: ActivityTracker,
    running: HashMap<i64, JoinHandle<()>>,
    event_tx: mpsc::Sender<TaskEvent>,
    event_rx: mpsc::Receiver<TaskEvent>,
    shutdown_rx: watch::Receiver<bool>,
    last_weekly_update: Option<chrono::DateTime<Utc>>,
}

impl Daemon {
    /// Create a daemon around an opened store.
    ///
    /// The returned sender flips the shutdown flag; the daemon notices at
    /// the next poll boundary.
    pub fn new(store: Store, config: Config) -> (Self, watch::Sender<bool>) {
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let weekly = WeeklyBudget::new(
            config.quota.weekly_target_pct,
            config.daemon.max_parallel_tasks,
        );

        (
            Self {
                config,
                store: Arc::new(Mutex::new(store)),
                weekly,
                activity: ActivityTracker::new(),
                running: HashMap::new(),
                event_tx,
                event_rx,
                shutdown_rx,
                last_weekly_update: None,
            },
            shutdown_tx,
        )
    }

    /// Shared handle to the store.
    pub fn store(&self) -> Arc<Mutex<Store>> {
        self.store.clone()
    }

    /// Number of currently running tasks.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Run until the shutdown flag is set, then drain in-flight tasks.
    pub async fn run(&mut self) -> Result<()> {
        tracing::info!(pid = std::process::id(), "Daemon started");
        let poll = Duration::from_secs(self.config.daemon.poll_interval_secs);

        while !*self.shutdown_rx.borrow() {
            if let Err(e) = self.tick().await {
                tracing::error!(error = %e, "Error in daemon tick");
            }

            // Cancellable wait: poll interval or shutdown, whichever first
            let mut shutdown_rx = self.shutdown_rx.clone();
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = shutdown_rx.changed() => {}
            }
        }

        tracing::info!(
            in_flight = self.running.len(),
            "Shutdown requested, draining in-flight tasks"
        );
        for (task_id, handle) in self.running.drain() {
            if let Err(e) = handle.await {
                tracing::error!(task_id, error = ?e, "Task panicked during drain");
            }
        }

        tracing::info!("Daemon stopped");
        Ok(())
    }

    /// One scheduling tick.
    pub async fn tick(&mut self) -> Result<()> {
        self.process_events();
        self.reap_finished();

        {
            let store = self.store.lock().expect("store lock poisoned");
            if let Err(e) = self.activity.record(&store) {
                tracing::warn!(error = %e, "Could not record activity");
            }
        }

        self.maybe_update_weekly().await;

        let decision = {
            let store = self.store.lock().expect("store lock poisoned");
            decide(
                &store,
                &self.config,
                self.weekly.ceiling(),
                self.running.len(),
                self.config.budget.max_task_usd,
            )?
        };

        if decision.allowed {
            tracing::info!(reason = %decision.reason, "Admission granted");
            self.spawn_next_task()?;
        } else {
            tracing::debug!(reason = %decision.reason, "Not executing");
        }

        Ok(())
    }

    /// Refresh the weekly budget ceiling on its cadence, feeding the
    /// snapshot back into the correction store as an auto-sync.
    async fn maybe_update_weekly(&mut self) {
        if !self.config.daemon.auto_sync {
            return;
        }
        let now = Utc::now();
        let due = match self.last_weekly_update {
            None => true,
            Some(last) => {
                now - last
                    >= chrono::Duration::minutes(self.config.daemon.weekly_update_minutes as i64)
            }
        };
        if !due {
            return;
        }
        self.last_weekly_update = Some(now);

        let snapshot = fetch_usage().await;
        let hours = hours_until_weekly_reset(
            now,
            self.config.quota.weekly_reset_day,
            self.config.quota.weekly_reset_hour,
        );
        self.weekly
            .update(snapshot.as_ref(), hours, self.running.len(), now);

        let store = self.store.lock().expect("store lock poisoned");
        if let Some(snapshot) = snapshot
            && let Err(e) = corrections::apply_snapshot(&store, &self.config, &snapshot)
        {
            tracing::warn!(error = %e, "Could not apply usage snapshot");
        }

        // Relearn the activity grid on the same cadence
        if let Err(e) = crate::patterns::schedule::update_patterns(&store) {
            tracing::warn!(error = %e, "Could not update schedule patterns");
        }
    }

    fn process_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                TaskEvent::Finished { task_id, success } => {
                    tracing::info!(task_id, success, "Task finished");
                    self.running.remove(&task_id);
                }
            }
        }
    }

    fn reap_finished(&mut self) {
        self.running.retain(|task_id, handle| {
            if handle.is_finished() {
                tracing::debug!(task_id, "Reaped finished task handle");
                false
            } else {
                true
            }
        });
    }

    /// Claim the head of the queue and spawn its execution.
    fn spawn_next_task(&mut self) -> Result<()> {
        let (task, tier) = {
            let store = self.store.lock().expect("store lock poisoned");

            let Some(mut task) = next_task(&store)? else {
                return Ok(());
            };
            let tier = select_tier(&store, &self.config, &task)?;

            // CAS: if another scheduler claimed it between the read and
            // here, skip this tick
            if !store.claim_task(task.id, tier)? {
                tracing::debug!(task_id = task.id, "Task already claimed, skipping");
                return Ok(());
            }

            if task.work_dir.is_empty() {
                task.work_dir = std::env::current_dir()
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_default();
            }
            task.status = TaskStatus::Running;
            task.tier = Some(tier);
            task.started_at = Some(Utc::now());
            store.update_task(&task)?;
            (task, tier)
        };

        tracing::info!(task_id = task.id, title = %task.title, tier = %tier, "Starting task");

        let store = self.store.clone();
        let config = self.config.clone();
        let event_tx = self.event_tx.clone();
        let task_id = task.id;

        let handle = tokio::spawn(async move {
            let success = run_one_task(&store, &config, task).await;
            let _ = event_tx.send(TaskEvent::Finished { task_id, success }).await;
        });

        self.running.insert(task_id, handle);
        Ok(())
    }
}

/// Drive one claimed task to a terminal state.
///
/// Returns true on completion. All errors are captured into the task's
/// result summary; nothing propagates to the control loop.
async fn run_one_task(store: &Arc<Mutex<Store>>, config: &Config, mut task: Task) -> bool {
    let tier = task.tier.unwrap_or_else(|| config.default_tier());
    let work_dir = task.work_dir.clone();

    // Branch isolation when the target is a clean git repository
    let sandbox: Option<SandboxContext> = if std::path::Path::new(&work_dir).join(".git").exists() {
        match create_sandbox(task.id, &task.title, &work_dir) {
            Ok(ctx) => {
                task.work_branch = ctx.branch_name.clone();
                let store = store.lock().expect("store lock poisoned");
                if let Err(e) = store.update_task(&task) {
                    tracing::warn!(error = %e, "Could not persist work branch");
                }
                tracing::info!(branch = %ctx.branch_name, "Created sandbox branch");
                Some(ctx)
            }
            Err(e) => {
                finish_task(store, &mut task, TaskStatus::Failed, &format!("Error: {}", e));
                return false;
            }
        }
    } else {
        None
    };

    let prompt = format!(
        "Task: {}\nDescription: {}\n\nPlease complete this task. Make all necessary \
         code changes and commit your work with a descriptive message.",
        task.title, task.description
    );

    let budget = {
        let store = store.lock().expect("store lock poisoned");
        task_budget(&store, config).unwrap_or(config.budget.max_task_usd)
    };

    let result = execute_task(store, config, &prompt, &work_dir, Some(task.id), budget, tier).await;

    let success = result.success;
    if success {
        let summary: String = result.output.chars().take(RESULT_SUMMARY_MAX).collect();
        finish_task(store, &mut task, TaskStatus::Completed, &summary);
        tracing::info!(
            task_id = task.id,
            cost_usd = result.cost_usd,
            duration_s = result.duration_seconds,
            "Task completed"
        );
    } else {
        finish_task(
            store,
            &mut task,
            TaskStatus::Failed,
            &format!("Error: {}", result.error),
        );
        tracing::warn!(task_id = task.id, error = %result.error, "Task failed");
    }

    // Restore the original checkout whatever the outcome; the branch
    // itself is kept for review
    if let Some(ctx) = sandbox
        && let Err(e) = cleanup_sandbox(&ctx, true)
    {
        tracing::error!(error = %e, "Failed to clean up sandbox");
    }

    success
}

fn finish_task(store: &Arc<Mutex<Store>>, task: &mut Task, status: TaskStatus, summary: &str) {
    task.status = status;
    task.result_summary = summary.to_string();
    task.completed_at = Some(Utc::now());

    let store = store.lock().expect("store lock poisoned");
    if let Err(e) = store.update_task(task) {
        tracing::error!(task_id = task.id, error = %e, "Could not persist terminal task state");
    }
}

/// One-line status summary used by the CLI.
pub fn status_summary(store: &Store, config: &Config) -> Result<Vec<String>> {
    let mut lines = Vec::new();

    match estimator::estimate_remaining(store, config, config.default_tier()) {
        Ok(status) => {
            lines.push(format!(
                "Quota:   {}/{} remaining ({:.0}%)",
                status.remaining, status.limit, status.remaining_pct
            ));
            lines.push(format!(
                "         {} available for autonomous use",
                status.available_for_autonomous
            ));
        }
        Err(_) => lines.push("Quota:   no data yet".to_string()),
    }

    let running = store.tasks_by_status(&[TaskStatus::Running])?;
    let pending = store.count_by_status(TaskStatus::Pending)?;
    let completed = store.count_by_status(TaskStatus::Completed)?;
    lines.push(format!(
        "Tasks:   {} running, {} pending, {} completed",
        running.len(),
        pending,
        completed
    ));
    for task in &running {
        lines.push(format!("         > #{}: {}", task.id, task.title));
    }

    Ok(lines)
}
