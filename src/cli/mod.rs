//! CLI structure and argument parsing.

pub mod commands;

pub use commands::{Cli, Commands};
