//! The polling control loop and its lifecycle plumbing.

pub mod pidfile;
pub mod runner;

pub use runner::{Daemon, TaskEvent};
