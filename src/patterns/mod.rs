//! Operator activity detection, schedule learning, and idle forecasting.
//!
//! These are secondary signals: admission does not gate on them. The
//! forecast feeds the tier selector's upgrade check and the status display.

pub mod activity;
pub mod predictor;
pub mod schedule;

pub use activity::ActivityTracker;
pub use predictor::{IdleWindow, predict_idle_windows, predict_next_return};
