// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Canonical task name type used throughout the engine.
///
/// Names are the identity of a task in telemetry and in dependency edges, so
/// they must be unique within one event stream.
pub type TaskName = String;

/// Lifecycle state of a task or work unit.
///
/// - `Pending`: registered but the body has not started yet.
/// - `Running`: the body (or work future) is executing.
/// - `Done` / `Skipped` / `Error`: terminal; once reached the state never
///   changes again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Pending,
    Running,
    Done,
    Skipped,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Skipped | TaskStatus::Error)
    }

    /// Whether moving from `self` to `next` is a legal lifecycle step.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Running) => true,
            (TaskStatus::Running, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Skipped => "skipped",
            TaskStatus::Error => "error",
        };
        f.write_str(s)
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "done" => Ok(TaskStatus::Done),
            "skipped" => Ok(TaskStatus::Skipped),
            "error" => Ok(TaskStatus::Error),
            other => Err(format!(
                "invalid task status: {other} (expected pending, running, done, skipped or error)"
            )),
        }
    }
}

/// Progress reported by a running work unit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum ProgressValue {
    /// Work is ongoing but its size is unknown.
    Indefinite,
    /// Number of items handled so far. Never decreases within one work unit.
    Count(u64),
    /// Fraction of the work completed, in `[0, 1]`.
    Ratio(f64),
}

impl ProgressValue {
    /// Build a ratio, clamping into `[0, 1]` (NaN becomes `0`).
    pub fn ratio(value: f64) -> Self {
        if value.is_nan() {
            ProgressValue::Ratio(0.0)
        } else {
            ProgressValue::Ratio(value.clamp(0.0, 1.0))
        }
    }
}
