//! Task execution: agent CLI invocation, git sandbox isolation, and the
//! budget guard.

pub mod executor;
pub mod monitor;
pub mod sandbox;

pub use executor::{ExecutionResult, execute_task};
pub use sandbox::SandboxContext;
