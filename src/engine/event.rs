// src/engine/event.rs

//! Lifecycle events emitted by the engine.
//!
//! The set of event kinds is closed; consumers are expected to `match`
//! exhaustively so a new kind is a compile error rather than a silently
//! ignored line of telemetry.

use chrono::{DateTime, Utc};

use crate::engine::outcome::{TaskError, TaskResult};
use crate::types::{ProgressValue, TaskName, TaskStatus};

/// How a task settled, as carried by [`EventKind::TaskEnd`].
///
/// The success payload itself stays with the [`TaskResult`]; telemetry only
/// needs to know which way the task went.
#[derive(Debug, Clone)]
pub enum EndOutcome {
    Done,
    Skipped,
    Failed(TaskError),
}

impl EndOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            EndOutcome::Done => TaskStatus::Done,
            EndOutcome::Skipped => TaskStatus::Skipped,
            EndOutcome::Failed(_) => TaskStatus::Error,
        }
    }
}

impl<T> From<&TaskResult<T>> for EndOutcome {
    fn from(result: &TaskResult<T>) -> Self {
        match result {
            TaskResult::Ok(_) => EndOutcome::Done,
            TaskResult::Skipped => EndOutcome::Skipped,
            TaskResult::Err(err) => EndOutcome::Failed(err.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EventKind {
    TaskStart {
        name: TaskName,
    },
    TaskEnd {
        name: TaskName,
        outcome: EndOutcome,
    },
    WorkStart {
        task: TaskName,
        description: Option<String>,
    },
    WorkDescription {
        task: TaskName,
        description: String,
    },
    WorkProgress {
        task: TaskName,
        value: ProgressValue,
    },
    /// `failure` holds the rendered cause when the work unit failed.
    WorkEnd {
        task: TaskName,
        failure: Option<String>,
    },
    SpawnStart {
        parent: TaskName,
        children: Vec<TaskName>,
    },
    SpawnEnd {
        parent: TaskName,
    },
    /// `task` awaited the result of `depends_on`.
    TaskDependency {
        task: TaskName,
        depends_on: TaskName,
    },
}

impl EventKind {
    /// Name of the task that owns this event.
    pub fn owner(&self) -> &str {
        match self {
            EventKind::TaskStart { name } | EventKind::TaskEnd { name, .. } => name,
            EventKind::WorkStart { task, .. }
            | EventKind::WorkDescription { task, .. }
            | EventKind::WorkProgress { task, .. }
            | EventKind::WorkEnd { task, .. }
            | EventKind::TaskDependency { task, .. } => task,
            EventKind::SpawnStart { parent, .. } | EventKind::SpawnEnd { parent } => parent,
        }
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::TaskStart { .. } => "task_start",
            EventKind::TaskEnd { .. } => "task_end",
            EventKind::WorkStart { .. } => "work_start",
            EventKind::WorkDescription { .. } => "work_description",
            EventKind::WorkProgress { .. } => "work_progress",
            EventKind::WorkEnd { .. } => "work_end",
            EventKind::SpawnStart { .. } => "spawn_start",
            EventKind::SpawnEnd { .. } => "spawn_end",
            EventKind::TaskDependency { .. } => "task_dependency",
        }
    }
}

/// An event stamped with the instant it was appended to the stream.
#[derive(Debug, Clone)]
pub struct TaskEvent {
    /// Position in the stream, starting at 0.
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub kind: EventKind,
}
