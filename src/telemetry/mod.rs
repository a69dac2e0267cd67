// src/telemetry/mod.rs

//! Consumers of the engine's event stream.
//!
//! - [`board`] folds events into per-task state.
//! - [`sort`] orders tasks by their declared dependencies.
//! - [`format`] renders durations, progress and failures.
//! - [`reporter`] logs a live stream through `tracing`.

pub mod board;
pub mod format;
pub mod reporter;
pub mod sort;

pub use board::{BoardSummary, TaskBoard, TaskState, WorkState};
pub use reporter::report;
pub use sort::sort_by_dependencies;
