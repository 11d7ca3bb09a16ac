//! SQLite persistence for tasks, usage, quota windows, and activity data.
//!
//! A single `Store` wraps one rusqlite connection in WAL mode. The daemon
//! shares it behind `Arc<Mutex<_>>`; writes are short transactions and the
//! usage log is append-only. The pending->running transition goes through
//! `claim_task`, a compare-and-swap on the status column, so two ticks can
//! never admit the same task.

use chrono::{DateTime, Utc};
use eyre::{Context, Result};
use rusqlite::{Connection, params};
use std::fs;
use std::path::Path;

use crate::domain::{
    ActivitySession, CorrectionScope, ModelTier, QuotaCorrection, QuotaWindow, SchedulePattern,
    Task, TaskSource, TaskStatus, UsageEvent,
};

const DB_FILE_NAME: &str = "nightshift.db";

/// Store manages all persisted state in a single SQLite database.
pub struct Store {
    db: Connection,
}

impl Store {
    /// Open or create the store in the default data directory.
    pub fn open_default() -> Result<Self> {
        Self::open_at(&crate::config::Config::data_dir())
    }

    /// Open or create a store at the specified directory.
    ///
    /// Useful for testing with custom paths.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create data directory: {}", base_dir.display()))?;

        let db_path = base_dir.join(DB_FILE_NAME);
        let db = Connection::open(&db_path)
            .with_context(|| format!("Failed to open SQLite database: {}", db_path.display()))?;

        db.pragma_update(None, "journal_mode", "WAL")?;
        db.pragma_update(None, "foreign_keys", "ON")?;

        Self::init_schema(&db)?;

        Ok(Self { db })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS usage_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                tier TEXT NOT NULL,
                input_tokens INTEGER NOT NULL DEFAULT 0,
                output_tokens INTEGER NOT NULL DEFAULT 0,
                cost_usd REAL NOT NULL DEFAULT 0.0,
                task_id INTEGER,
                autonomous INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS quota_windows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                window_start TEXT NOT NULL,
                window_hours INTEGER NOT NULL DEFAULT 5,
                estimated_limit INTEGER NOT NULL DEFAULT 225,
                used_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS quota_corrections (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                window_id INTEGER NOT NULL,
                tier TEXT,
                scope TEXT NOT NULL,
                pct_used REAL NOT NULL,
                corrected_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT 'manual',
                source_ref TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'pending',
                priority REAL NOT NULL DEFAULT 0.0,
                tier TEXT,
                work_branch TEXT NOT NULL DEFAULT '',
                work_dir TEXT NOT NULL DEFAULT '',
                result_summary TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                started_at TEXT,
                completed_at TEXT
            );

            CREATE TABLE IF NOT EXISTS schedule_patterns (
                day_of_week INTEGER NOT NULL,
                hour INTEGER NOT NULL,
                activity_probability REAL NOT NULL DEFAULT 0.0,
                avg_usage REAL NOT NULL DEFAULT 0.0,
                sample_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (day_of_week, hour)
            );

            CREATE TABLE IF NOT EXISTS activity_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                start_time TEXT NOT NULL,
                end_time TEXT,
                message_count INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_usage_timestamp ON usage_log(timestamp);
            CREATE INDEX IF NOT EXISTS idx_usage_tier ON usage_log(tier);
            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_corrections_window ON quota_corrections(window_id);
            CREATE INDEX IF NOT EXISTS idx_activity_start ON activity_sessions(start_time);
            "#,
        )
        .context("Failed to initialize database schema")?;

        Ok(())
    }

    // --- Tasks ---

    /// Insert a new task and return its id.
    pub fn insert_task(&self, task: &Task) -> Result<i64> {
        self.db.execute(
            r#"
            INSERT INTO tasks
            (title, description, source, source_ref, status, priority, tier,
             work_branch, work_dir, result_summary, created_at, started_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                task.title,
                task.description,
                task.source.as_str(),
                task.source_ref,
                task.status.as_str(),
                task.priority,
                task.tier.map(|t| t.as_str()),
                task.work_branch,
                task.work_dir,
                task.result_summary,
                fmt_dt(task.created_at),
                task.started_at.map(fmt_dt),
                task.completed_at.map(fmt_dt),
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// Get a task by id.
    pub fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let mut stmt = self.db.prepare("SELECT * FROM tasks WHERE id = ?1")?;
        let mut rows = stmt.query([id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_task(row)?)),
            None => Ok(None),
        }
    }

    /// List tasks matching any of the given statuses, highest priority first,
    /// ties broken by earlier creation.
    pub fn tasks_by_status(&self, statuses: &[TaskStatus]) -> Result<Vec<Task>> {
        let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT * FROM tasks WHERE status IN ({}) ORDER BY priority DESC, created_at ASC",
            placeholders
        );
        let mut stmt = self.db.prepare(&sql)?;
        let values: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(values))?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }

    /// List all tasks, newest first.
    pub fn all_tasks(&self) -> Result<Vec<Task>> {
        let mut stmt = self.db.prepare("SELECT * FROM tasks ORDER BY created_at DESC")?;
        let mut rows = stmt.query([])?;

        let mut tasks = Vec::new();
        while let Some(row) = rows.next()? {
            tasks.push(row_to_task(row)?);
        }
        Ok(tasks)
    }

    /// Update a task's mutable fields.
    pub fn update_task(&self, task: &Task) -> Result<()> {
        self.db.execute(
            r#"
            UPDATE tasks SET title=?1, description=?2, source=?3, source_ref=?4, status=?5,
            priority=?6, tier=?7, work_branch=?8, work_dir=?9, result_summary=?10,
            started_at=?11, completed_at=?12 WHERE id=?13
            "#,
            params![
                task.title,
                task.description,
                task.source.as_str(),
                task.source_ref,
                task.status.as_str(),
                task.priority,
                task.tier.map(|t| t.as_str()),
                task.work_branch,
                task.work_dir,
                task.result_summary,
                task.started_at.map(fmt_dt),
                task.completed_at.map(fmt_dt),
                task.id,
            ],
        )?;
        Ok(())
    }

    /// Delete a task. Returns false if no row matched.
    pub fn delete_task(&self, id: i64) -> Result<bool> {
        let count = self.db.execute("DELETE FROM tasks WHERE id=?1", [id])?;
        Ok(count > 0)
    }

    /// Atomically transition a task from pending to running.
    ///
    /// This is the single admission point: the WHERE clause only matches
    /// status='pending', so concurrent callers race on the row update and
    /// exactly one wins. Returns false if the task was already claimed,
    /// finished, or removed.
    pub fn claim_task(&self, id: i64, tier: ModelTier) -> Result<bool> {
        let count = self.db.execute(
            "UPDATE tasks SET status='running', tier=?1, started_at=?2 \
             WHERE id=?3 AND status='pending'",
            params![tier.as_str(), fmt_dt(Utc::now()), id],
        )?;
        Ok(count > 0)
    }

    /// Count tasks in a given status.
    pub fn count_by_status(&self, status: TaskStatus) -> Result<usize> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?1",
            [status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // --- Usage log ---

    /// Append a usage event. The log is append-only; events are never updated.
    pub fn insert_usage(&self, event: &UsageEvent) -> Result<i64> {
        self.db.execute(
            r#"
            INSERT INTO usage_log (timestamp, tier, input_tokens, output_tokens, cost_usd, task_id, autonomous)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                fmt_dt(event.timestamp),
                event.tier.as_str(),
                event.input_tokens,
                event.output_tokens,
                event.cost_usd,
                event.task_id,
                event.autonomous as i64,
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// All usage events at or after the given instant, oldest first.
    pub fn usage_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageEvent>> {
        let mut stmt = self
            .db
            .prepare("SELECT * FROM usage_log WHERE timestamp >= ?1 ORDER BY timestamp")?;
        let mut rows = stmt.query([fmt_dt(since)])?;

        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(row_to_usage(row)?);
        }
        Ok(events)
    }

    /// Number of usage events for a tier at or after the given instant.
    pub fn tier_usage_count(&self, tier: ModelTier, since: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM usage_log WHERE tier = ?1 AND timestamp >= ?2",
            params![tier.as_str(), fmt_dt(since)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Number of usage events for a tier strictly after the given instant.
    ///
    /// Used when overlaying a correction: usage recorded before the
    /// correction's timestamp is already accounted for by the correction.
    pub fn tier_usage_count_after(&self, tier: ModelTier, after: DateTime<Utc>) -> Result<u32> {
        let count: i64 = self.db.query_row(
            "SELECT COUNT(*) FROM usage_log WHERE tier = ?1 AND timestamp > ?2",
            params![tier.as_str(), fmt_dt(after)],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Total autonomous spend for the calendar day containing `date` (UTC).
    pub fn daily_autonomous_cost(&self, date: DateTime<Utc>) -> Result<f64> {
        let day_start = date
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is valid")
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);
        let total: f64 = self.db.query_row(
            "SELECT COALESCE(SUM(cost_usd), 0.0) FROM usage_log \
             WHERE autonomous = 1 AND timestamp >= ?1 AND timestamp < ?2",
            params![fmt_dt(day_start), fmt_dt(day_end)],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    // --- Quota windows ---

    /// Insert a new quota window and return its id.
    pub fn insert_window(&self, window: &QuotaWindow) -> Result<i64> {
        self.db.execute(
            "INSERT INTO quota_windows (window_start, window_hours, estimated_limit, used_count) \
             VALUES (?1, ?2, ?3, ?4)",
            params![
                fmt_dt(window.window_start),
                window.window_hours,
                window.estimated_limit,
                window.used_count,
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// The most recently started window, if any.
    pub fn current_window(&self) -> Result<Option<QuotaWindow>> {
        let mut stmt = self
            .db
            .prepare("SELECT * FROM quota_windows ORDER BY window_start DESC LIMIT 1")?;
        let mut rows = stmt.query([])?;
        match rows.next()? {
            Some(row) => Ok(Some(QuotaWindow {
                id: row.get("id")?,
                window_start: parse_dt(row.get::<_, String>("window_start")?)?,
                window_hours: row.get("window_hours")?,
                estimated_limit: row.get("estimated_limit")?,
                used_count: row.get("used_count")?,
            })),
            None => Ok(None),
        }
    }

    // --- Quota corrections ---

    /// Record a correction and return its id.
    pub fn insert_correction(&self, correction: &QuotaCorrection) -> Result<i64> {
        self.db.execute(
            "INSERT INTO quota_corrections (window_id, tier, scope, pct_used, corrected_at) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                correction.window_id,
                correction.tier.map(|t| t.as_str()),
                correction.scope.as_str(),
                correction.pct_used,
                fmt_dt(correction.corrected_at),
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// The most recent correction for (window, tier, scope), or None.
    pub fn latest_correction(
        &self,
        window_id: i64,
        tier: Option<ModelTier>,
        scope: CorrectionScope,
    ) -> Result<Option<QuotaCorrection>> {
        let mut stmt = self.db.prepare(
            "SELECT * FROM quota_corrections \
             WHERE window_id = ?1 AND tier IS ?2 AND scope = ?3 \
             ORDER BY corrected_at DESC LIMIT 1",
        )?;
        let mut rows = stmt.query(params![window_id, tier.map(|t| t.as_str()), scope.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_correction(row)?)),
            None => Ok(None),
        }
    }

    // --- Schedule patterns ---

    /// Insert or replace the pattern for one (weekday, hour) slot.
    pub fn upsert_pattern(&self, pattern: &SchedulePattern) -> Result<()> {
        self.db.execute(
            r#"
            INSERT INTO schedule_patterns (day_of_week, hour, activity_probability, avg_usage, sample_count)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(day_of_week, hour) DO UPDATE SET
            activity_probability=excluded.activity_probability,
            avg_usage=excluded.avg_usage, sample_count=excluded.sample_count
            "#,
            params![
                pattern.day_of_week,
                pattern.hour,
                pattern.activity_probability,
                pattern.avg_usage,
                pattern.sample_count,
            ],
        )?;
        Ok(())
    }

    /// All recorded patterns ordered by (weekday, hour).
    pub fn patterns(&self) -> Result<Vec<SchedulePattern>> {
        let mut stmt = self
            .db
            .prepare("SELECT * FROM schedule_patterns ORDER BY day_of_week, hour")?;
        let mut rows = stmt.query([])?;

        let mut patterns = Vec::new();
        while let Some(row) = rows.next()? {
            patterns.push(SchedulePattern {
                day_of_week: row.get("day_of_week")?,
                hour: row.get("hour")?,
                activity_probability: row.get("activity_probability")?,
                avg_usage: row.get("avg_usage")?,
                sample_count: row.get("sample_count")?,
            });
        }
        Ok(patterns)
    }

    // --- Activity sessions ---

    /// Insert a new activity session and return its id.
    pub fn insert_session(&self, session: &ActivitySession) -> Result<i64> {
        self.db.execute(
            "INSERT INTO activity_sessions (start_time, end_time, message_count) VALUES (?1, ?2, ?3)",
            params![
                fmt_dt(session.start_time),
                session.end_time.map(fmt_dt),
                session.message_count,
            ],
        )?;
        Ok(self.db.last_insert_rowid())
    }

    /// Most recent sessions, newest first.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<ActivitySession>> {
        let mut stmt = self
            .db
            .prepare("SELECT * FROM activity_sessions ORDER BY start_time DESC LIMIT ?1")?;
        let mut rows = stmt.query([limit as i64])?;

        let mut sessions = Vec::new();
        while let Some(row) = rows.next()? {
            sessions.push(ActivitySession {
                id: row.get("id")?,
                start_time: parse_dt(row.get::<_, String>("start_time")?)?,
                end_time: row
                    .get::<_, Option<String>>("end_time")?
                    .map(parse_dt)
                    .transpose()?,
                message_count: row.get("message_count")?,
            });
        }
        Ok(sessions)
    }

    /// Update a session's end time and message count.
    pub fn update_session(&self, session: &ActivitySession) -> Result<()> {
        self.db.execute(
            "UPDATE activity_sessions SET end_time=?1, message_count=?2 WHERE id=?3",
            params![
                session.end_time.map(fmt_dt),
                session.message_count,
                session.id,
            ],
        )?;
        Ok(())
    }
}

fn fmt_dt(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn parse_dt(s: String) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(&s)
        .with_context(|| format!("Invalid timestamp in database: {}", s))?
        .with_timezone(&Utc))
}

fn row_to_task(row: &rusqlite::Row<'_>) -> Result<Task> {
    let source: String = row.get("source")?;
    let status: String = row.get("status")?;
    let tier: Option<String> = row.get("tier")?;
    Ok(Task {
        id: row.get("id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        source: TaskSource::parse(&source)
            .ok_or_else(|| eyre::eyre!("Unknown task source in database: {}", source))?,
        source_ref: row.get("source_ref")?,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| eyre::eyre!("Unknown task status in database: {}", status))?,
        priority: row.get("priority")?,
        tier: tier.as_deref().and_then(ModelTier::parse),
        work_branch: row.get("work_branch")?,
        work_dir: row.get("work_dir")?,
        result_summary: row.get("result_summary")?,
        created_at: parse_dt(row.get::<_, String>("created_at")?)?,
        started_at: row
            .get::<_, Option<String>>("started_at")?
            .map(parse_dt)
            .transpose()?,
        completed_at: row
            .get::<_, Option<String>>("completed_at")?
            .map(parse_dt)
            .transpose()?,
    })
}

fn row_to_usage(row: &rusqlite::Row<'_>) -> Result<UsageEvent> {
    let tier: String = row.get("tier")?;
    Ok(UsageEvent {
        id: row.get("id")?,
        timestamp: parse_dt(row.get::<_, String>("timestamp")?)?,
        tier: ModelTier::parse(&tier)
            .ok_or_else(|| eyre::eyre!("Unknown tier in usage log: {}", tier))?,
        input_tokens: row.get("input_tokens")?,
        output_tokens: row.get("output_tokens")?,
        cost_usd: row.get("cost_usd")?,
        task_id: row.get("task_id")?,
        autonomous: row.get::<_, i64>("autonomous")? != 0,
    })
}

fn row_to_correction(row: &rusqlite::Row<'_>) -> Result<QuotaCorrection> {
    let tier: Option<String> = row.get("tier")?;
    let scope: String = row.get("scope")?;
    Ok(QuotaCorrection {
        id: row.get("id")?,
        window_id: row.get("window_id")?,
        tier: tier.as_deref().and_then(ModelTier::parse),
        scope: CorrectionScope::parse(&scope)
            .ok_or_else(|| eyre::eyre!("Unknown correction scope in database: {}", scope))?,
        pct_used: row.get("pct_used")?,
        corrected_at: parse_dt(row.get::<_, String>("corrected_at")?)?,
    })
}
