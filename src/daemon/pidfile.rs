//! PID file management for the daemon.

use eyre::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const PID_FILE_NAME: &str = "nightshift.pid";

/// Path to the PID file under a data directory.
pub fn pid_file(data_dir: &Path) -> PathBuf {
    data_dir.join(PID_FILE_NAME)
}

/// Write the current process id.
pub fn write_pid(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    fs::write(pid_file(data_dir), std::process::id().to_string())
        .context("Failed to write PID file")?;
    Ok(())
}

/// Remove the PID file if present.
pub fn remove_pid(data_dir: &Path) {
    let _ = fs::remove_file(pid_file(data_dir));
}

/// Check if a daemon is running. Returns its PID, cleaning up stale files.
pub fn running_pid(data_dir: &Path) -> Option<u32> {
    let path = pid_file(data_dir);
    let content = fs::read_to_string(&path).ok()?;
    let pid: u32 = content.trim().parse().ok()?;

    if process_exists(pid) {
        Some(pid)
    } else {
        let _ = fs::remove_file(&path);
        None
    }
}

/// Signal 0 probes for process existence without touching it.
fn process_exists(pid: u32) -> bool {
    Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Send SIGTERM to a process.
pub fn terminate(pid: u32) -> Result<()> {
    let output = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .output()
        .context("Failed to run kill")?;
    if !output.status.success() {
        eyre::bail!("kill -TERM {} failed", pid);
    }
    Ok(())
}
