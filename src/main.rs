use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;

use nightshift::cli::commands::{
    Cli, Commands, DaemonCommands, QuotaCommands, ReviewCommands, ScheduleCommands, TaskCommands,
};
use nightshift::config::Config;
use nightshift::daemon::pidfile;
use nightshift::daemon::runner::{Daemon, status_summary};
use nightshift::domain::{ModelTier, TaskStatus};
use nightshift::patterns::predictor;
use nightshift::patterns::schedule::pattern_grid;
use nightshift::quota::corrections::{apply_correction, auto_sync};
use nightshift::quota::estimator::estimate_remaining;
use nightshift::review::{approve_task, reject_task, review_detail, reviewable_tasks};
use nightshift::storage::Store;
use nightshift::tasks::queue::{add_task, remove_task, scan_tasks};

fn setup_logging() -> Result<()> {
    let log_dir = Config::data_dir().join("logs");
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("nightshift.log");
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;
    config.validate()?;

    if cli.verbose {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match cli.command {
        Commands::Quota { command } => handle_quota(command, &config).await,
        Commands::Tasks { command } => handle_tasks(command, &config),
        Commands::Schedule { command } => handle_schedule(command, &config),
        Commands::Review { command } => handle_review(command, &config),
        Commands::Daemon { command } => handle_daemon(command, config).await,
    }
}

fn open_store() -> Result<Store> {
    Store::open_default()
}

// --- Quota commands ---

async fn handle_quota(command: QuotaCommands, config: &Config) -> Result<()> {
    let store = open_store()?;

    match command {
        QuotaCommands::Show => show_quota(&store, config),
        QuotaCommands::Correct {
            session,
            week_all,
            week_sonnet,
        } => {
            if session.is_none() && week_all.is_none() && week_sonnet.is_none() {
                eyre::bail!("Provide at least one of --session, --week-all, --week-sonnet");
            }
            apply_correction(&store, config, session, week_all, week_sonnet)?;
            if let Some(pct) = session {
                let limit = config.tier_limit(config.default_tier());
                let remaining =
                    nightshift::quota::corrections::implied_remaining(pct, limit);
                println!(
                    "Session correction applied: {:.0}% used -> ~{} messages remaining in current window.",
                    pct, remaining
                );
            }
            Ok(())
        }
        QuotaCommands::Sync => {
            if auto_sync(&store, config).await? {
                println!("{}", "Synced quota from usage API.".green());
                show_quota(&store, config)
            } else {
                eyre::bail!(
                    "Sync failed. Check that ~/.claude/.credentials.json exists and you have network access."
                );
            }
        }
        QuotaCommands::History { days } => show_history(&store, days),
    }
}

fn show_quota(store: &Store, config: &Config) -> Result<()> {
    println!("Quota Status");
    println!("{}", "=".repeat(60));

    println!("  {:<10}  {:>6}  {:>6}  {:>12}", "Tier", "Limit", "Used", "Remaining");
    println!("  {}", "-".repeat(42));
    for tier in ModelTier::ALL {
        let status = estimate_remaining(store, config, tier)?;
        println!(
            "  {:<10}  {:>6}  {:>6}  {:>5} ({:.0}%)",
            tier.as_str(),
            status.limit,
            status.used,
            status.remaining,
            status.remaining_pct
        );
    }

    let default = estimate_remaining(store, config, config.default_tier())?;
    println!();
    println!("Window:        {} - {}", default.window_start.format("%H:%M"), default.window_end.format("%H:%M"));
    println!("Safety margin: {} messages reserved", default.safety_reserved);
    println!("Autonomous:    {} messages available", default.available_for_autonomous);
    Ok(())
}

fn show_history(store: &Store, days: i64) -> Result<()> {
    let since = chrono::Utc::now() - chrono::Duration::days(days);
    let records = store.usage_since(since)?;

    if records.is_empty() {
        println!("No usage records in the last {} day(s).", days);
        return Ok(());
    }

    println!(
        "{:<20}  {:<8}  {:>8}  {:>8}  {:>9}  {:>4}",
        "Date", "Tier", "Input", "Output", "Cost ($)", "Auto"
    );
    println!("{}", "-".repeat(70));

    let mut total_cost = 0.0;
    for record in &records {
        println!(
            "{:<20}  {:<8}  {:>8}  {:>8}  {:>9.4}  {:>4}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.tier.as_str(),
            record.input_tokens,
            record.output_tokens,
            record.cost_usd,
            if record.autonomous { "Y" } else { "" }
        );
        total_cost += record.cost_usd;
    }

    println!("{}", "-".repeat(70));
    println!("{:<20}  {:<8}  {:>8}  {:>8}  {:>9.4}", "TOTAL", "", "", "", total_cost);
    Ok(())
}

// --- Task commands ---

fn handle_tasks(command: TaskCommands, config: &Config) -> Result<()> {
    let store = open_store()?;

    match command {
        TaskCommands::List { status } => {
            let tasks = if status == "all" {
                store.all_tasks()?
            } else {
                let parsed = TaskStatus::parse(&status)
                    .ok_or_else(|| eyre::eyre!("Unknown status: {}", status))?;
                store.tasks_by_status(&[parsed])?
            };

            if tasks.is_empty() {
                println!("No tasks found.");
                return Ok(());
            }

            println!("{:>4}  {:<10}  {:>5}  {:<12}  Title", "ID", "Status", "Pri", "Source");
            println!("{}", "-".repeat(72));
            for task in &tasks {
                let title: String = task.title.chars().take(47).collect();
                println!(
                    "{:>4}  {:<10}  {:>5.1}  {:<12}  {}",
                    task.id,
                    task.status.to_string(),
                    task.priority,
                    task.source.to_string(),
                    title
                );
            }
            println!("\n{} task(s) total.", tasks.len());
            Ok(())
        }
        TaskCommands::Add {
            title,
            description,
            priority,
            tier,
        } => {
            let tier = match tier {
                Some(name) => Some(
                    ModelTier::parse(&name)
                        .ok_or_else(|| eyre::eyre!("Unknown tier: {}", name))?,
                ),
                None => None,
            };
            let task = add_task(&store, &title, &description, priority, tier)?;
            println!(
                "Added task #{}: {} (priority {:.1})",
                task.id, task.title, task.priority
            );
            Ok(())
        }
        TaskCommands::Scan { path } => {
            let inserted = scan_tasks(&store, config, &path)?;
            println!("Inserted {} new task(s).", inserted);
            Ok(())
        }
        TaskCommands::Remove { id } => {
            let task = remove_task(&store, id)?;
            println!("Removed task #{}: {}", id, task.title);
            Ok(())
        }
    }
}

// --- Schedule commands ---

fn handle_schedule(command: ScheduleCommands, config: &Config) -> Result<()> {
    let store = open_store()?;

    match command {
        ScheduleCommands::Show => {
            let header: String = (0..24).map(|h| format!("{:>3}", h)).collect();
            println!("     {}", header);
            for row in pattern_grid(&store)? {
                println!("{}", row);
            }
            println!();
            println!("Legend: · no data  ░ <25%  ▒ <50%  ▓ <75%  █ >=75%");
            Ok(())
        }
        ScheduleCommands::Predict { hours } => {
            let windows = predictor::predict_idle_windows(&store, hours)?;
            println!("Idle window predictions (next {}h):", hours);
            println!();

            if windows.is_empty() {
                println!("  No idle windows predicted.");
                return Ok(());
            }

            for (i, window) in windows.iter().enumerate() {
                println!(
                    "  {}. {} - {}  ({:.1}h, confidence {:.0}%)",
                    i + 1,
                    window.start.format("%a %H:%M"),
                    window.end.format("%a %H:%M"),
                    window.duration_hours,
                    window.confidence * 100.0
                );
            }

            let waste = predictor::estimate_wasted_quota(&store, config, hours)?;
            println!();
            println!("Estimated waste if no autonomous work is scheduled:");
            println!("  Idle hours:       {:.1}", waste.idle_hours);
            println!("  Wasted messages:  ~{}", waste.wasted_messages);
            println!("  Wasted value:     ~${:.2}", waste.wasted_cost_usd);

            if let Some(next) = predictor::predict_next_return(&store)? {
                println!();
                println!("Predicted next return: {}", next.format("%a %H:%M"));
            }
            Ok(())
        }
    }
}

// --- Review commands ---

fn handle_review(command: ReviewCommands, _config: &Config) -> Result<()> {
    let store = open_store()?;

    match command {
        ReviewCommands::List => {
            let tasks = reviewable_tasks(&store)?;
            if tasks.is_empty() {
                println!("No completed tasks awaiting review.");
                return Ok(());
            }

            println!("{:>4}  {:<40}  Title", "ID", "Branch");
            println!("{}", "-".repeat(80));
            for task in &tasks {
                let branch = if task.work_branch.is_empty() {
                    "(no branch)"
                } else {
                    &task.work_branch
                };
                println!("{:>4}  {:<40}  {}", task.id, branch, task.title);
            }
            Ok(())
        }
        ReviewCommands::Show { id } => {
            let detail = review_detail(&store, id)?;
            let task = &detail.task;

            println!("Task #{}: {}", task.id, task.title);
            println!("Status:  {}", task.status);
            println!("Source:  {} ({})", task.source, task.source_ref);
            println!(
                "Branch:  {}",
                if task.work_branch.is_empty() { "N/A" } else { &task.work_branch }
            );
            println!("Created: {}", task.created_at);

            if !task.result_summary.is_empty() {
                println!("\n--- Result Summary ---");
                println!("{}", task.result_summary);
            }
            if let Some(log) = &detail.log {
                println!("\n--- Commits ---");
                println!("{}", if log.is_empty() { "(no commits)" } else { log });
            }
            if let Some(diff) = &detail.diff {
                println!("\n--- Diff ---");
                println!("{}", if diff.is_empty() { "(no changes)" } else { diff });
            }
            Ok(())
        }
        ReviewCommands::Approve { id } => {
            let task = approve_task(&store, id)?;
            println!("{}", format!("Task #{} approved and merged.", task.id).green());
            Ok(())
        }
        ReviewCommands::Reject { id } => {
            let task = reject_task(&store, id)?;
            println!("Task #{} rejected.", task.id);
            Ok(())
        }
    }
}

// --- Daemon commands ---

async fn handle_daemon(command: DaemonCommands, config: Config) -> Result<()> {
    let data_dir = Config::data_dir();

    match command {
        DaemonCommands::Start { foreground } => {
            if let Some(pid) = pidfile::running_pid(&data_dir) {
                eyre::bail!("Daemon already running (PID {})", pid);
            }

            if foreground {
                println!("Starting nightshift daemon in foreground...");
                run_daemon(config).await
            } else {
                let exe = std::env::current_exe().context("Cannot resolve own executable")?;
                let child = std::process::Command::new(exe)
                    .args(["daemon", "start", "--foreground"])
                    .stdin(std::process::Stdio::null())
                    .stdout(std::process::Stdio::null())
                    .stderr(std::process::Stdio::null())
                    .spawn()
                    .context("Failed to spawn background daemon")?;
                println!("Daemon started (PID {})", child.id());
                println!("Log: {}", data_dir.join("logs").join("nightshift.log").display());
                Ok(())
            }
        }
        DaemonCommands::Stop => {
            let Some(pid) = pidfile::running_pid(&data_dir) else {
                println!("Daemon is not running");
                return Ok(());
            };

            pidfile::terminate(pid)?;
            println!("Sent SIGTERM to daemon (PID {})", pid);

            for _ in 0..10 {
                if pidfile::running_pid(&data_dir).is_none() {
                    println!("Daemon stopped");
                    return Ok(());
                }
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;
            }
            println!("Daemon may still be shutting down");
            Ok(())
        }
        DaemonCommands::Status => {
            match pidfile::running_pid(&data_dir) {
                Some(pid) => println!("Daemon:  {} (PID {})", "running".green(), pid),
                None => println!("Daemon:  stopped"),
            }

            let store = open_store()?;
            for line in status_summary(&store, &config)? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

async fn run_daemon(config: Config) -> Result<()> {
    let data_dir = Config::data_dir();
    pidfile::write_pid(&data_dir)?;

    let store = Store::open_default()?;
    let (mut daemon, shutdown) = Daemon::new(store, config);

    // SIGINT/SIGTERM flip the shutdown flag; the loop notices at the next
    // poll boundary
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
        info!("Shutdown signal received");
        let _ = shutdown.send(true);
    });

    let result = daemon.run().await;
    pidfile::remove_pid(&data_dir);
    result
}
