//! CLI command definitions using clap.
//!
//! Command groups:
//! - quota: show/correct/sync/history
//! - tasks: list/add/scan/remove
//! - schedule: show/predict
//! - review: list/show/approve/reject
//! - daemon: start/stop/status

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Nightshift - run queued autonomous coding tasks during idle time
#[derive(Parser, Debug)]
#[command(name = "nightshift")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Quota tracking and estimation
    Quota {
        #[command(subcommand)]
        command: QuotaCommands,
    },

    /// Task queue management
    Tasks {
        #[command(subcommand)]
        command: TaskCommands,
    },

    /// Activity patterns and idle predictions
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommands,
    },

    /// Review completed autonomous work
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },

    /// Daemon management
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
}

/// Quota subcommands
#[derive(Subcommand, Debug)]
pub enum QuotaCommands {
    /// Show estimated remaining quota per tier
    Show,

    /// Record usage percentages from Claude's /usage display
    Correct {
        /// "Current session X%" value (0-100)
        #[arg(long)]
        session: Option<f64>,

        /// "Current week (all models) X%" value (0-100)
        #[arg(long)]
        week_all: Option<f64>,

        /// "Current week (sonnet only) X%" value (0-100)
        #[arg(long)]
        week_sonnet: Option<f64>,
    },

    /// Fetch current quota from the usage API and apply automatically
    Sync,

    /// Show usage history
    History {
        /// Number of days to show
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

/// Task subcommands
#[derive(Subcommand, Debug)]
pub enum TaskCommands {
    /// List tasks in the queue
    List {
        /// Filter by status (pending, running, completed, failed, cancelled, all)
        #[arg(short, long, default_value = "all")]
        status: String,
    },

    /// Add a task to the queue
    Add {
        /// Task title
        title: String,

        /// Task description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Priority score (0 = score automatically)
        #[arg(short, long, default_value_t = 0.0)]
        priority: f64,

        /// Tier to use (haiku/sonnet/opus); omit for automatic selection
        #[arg(short, long)]
        tier: Option<String>,
    },

    /// Scan a repository for tasks
    Scan {
        /// Path to scan
        #[arg(long, default_value = ".")]
        path: String,
    },

    /// Remove a task from the queue
    Remove {
        /// Task id to remove
        id: i64,
    },
}

/// Schedule subcommands
#[derive(Subcommand, Debug)]
pub enum ScheduleCommands {
    /// Show learned activity patterns
    Show,

    /// Predict idle windows and potential waste
    Predict {
        /// Hours to predict ahead
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },
}

/// Review subcommands
#[derive(Subcommand, Debug)]
pub enum ReviewCommands {
    /// List completed tasks awaiting review
    List,

    /// Show details and diff for a completed task
    Show {
        /// Task id
        id: i64,
    },

    /// Approve and merge a completed task
    Approve {
        /// Task id
        id: i64,
    },

    /// Reject and clean up a completed task
    Reject {
        /// Task id
        id: i64,
    },
}

/// Daemon subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum DaemonCommands {
    /// Start the daemon
    Start {
        /// Run in the foreground instead of detaching
        #[arg(short, long)]
        foreground: bool,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon, quota, and task status
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parses() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_tasks_add() {
        let cli = Cli::parse_from([
            "nightshift", "tasks", "add", "Fix the bug", "-d", "details", "-p", "50",
        ]);
        match cli.command {
            Commands::Tasks {
                command: TaskCommands::Add {
                    title,
                    description,
                    priority,
                    tier,
                },
            } => {
                assert_eq!(title, "Fix the bug");
                assert_eq!(description, "details");
                assert_eq!(priority, 50.0);
                assert!(tier.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_quota_correct() {
        let cli = Cli::parse_from([
            "nightshift", "quota", "correct", "--session", "12", "--week-all", "28",
        ]);
        match cli.command {
            Commands::Quota {
                command: QuotaCommands::Correct {
                    session,
                    week_all,
                    week_sonnet,
                },
            } => {
                assert_eq!(session, Some(12.0));
                assert_eq!(week_all, Some(28.0));
                assert!(week_sonnet.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_daemon_start_foreground() {
        let cli = Cli::parse_from(["nightshift", "daemon", "start", "--foreground"]);
        match cli.command {
            Commands::Daemon {
                command: DaemonCommands::Start { foreground },
            } => assert!(foreground),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
