//! Admission control: decide when to start autonomous work and at what
//! concurrency level.

pub mod admission;
pub mod concurrency;

pub use admission::{Decision, decide};
pub use concurrency::window_parallelism;
