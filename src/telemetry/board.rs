// src/telemetry/board.rs

//! Per-task state folded from an event stream.
//!
//! The board is what a progress display would render: one entry per task,
//! in the order tasks first appeared, each with its work units, children
//! and declared dependencies.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::engine::{EndOutcome, EventKind, TaskError, TaskEvent};
use crate::types::{ProgressValue, TaskName, TaskStatus};

/// State of one work unit as last reported.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkState {
    pub status: TaskStatus,
    pub description: Option<String>,
    pub progress: Option<ProgressValue>,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskState {
    pub status: TaskStatus,
    pub works: Vec<WorkState>,
    pub children: Vec<TaskName>,
    pub dependencies: Vec<TaskName>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<TaskError>,
}

impl TaskState {
    /// The work unit currently (or most recently) running.
    pub fn current_work(&self) -> Option<&WorkState> {
        self.works.last()
    }

    pub fn elapsed(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Number of tasks in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BoardSummary {
    pub pending: usize,
    pub running: usize,
    pub done: usize,
    pub skipped: usize,
    pub error: usize,
}

impl BoardSummary {
    pub fn total(&self) -> usize {
        self.pending + self.running + self.done + self.skipped + self.error
    }
}

#[derive(Debug, Default)]
pub struct TaskBoard {
    order: Vec<TaskName>,
    states: HashMap<TaskName, TaskState>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the board.
    pub fn apply(&mut self, event: &TaskEvent) {
        match &event.kind {
            EventKind::TaskStart { name } => {
                let state = self.entry(name);
                state.status = TaskStatus::Running;
                state.started_at = Some(event.at);
            }
            EventKind::TaskEnd { name, outcome } => {
                let state = self.entry(name);
                state.status = outcome.status();
                state.ended_at = Some(event.at);
                state.error = match outcome {
                    EndOutcome::Failed(err) => Some(err.clone()),
                    EndOutcome::Done | EndOutcome::Skipped => None,
                };
            }
            EventKind::WorkStart { task, description } => {
                self.entry(task).works.push(WorkState {
                    status: TaskStatus::Running,
                    description: description.clone(),
                    progress: None,
                    failure: None,
                });
            }
            EventKind::WorkDescription { task, description } => {
                if let Some(work) = self.entry(task).works.last_mut() {
                    work.description = Some(description.clone());
                }
            }
            EventKind::WorkProgress { task, value } => {
                if let Some(work) = self.entry(task).works.last_mut() {
                    work.progress = Some(*value);
                }
            }
            EventKind::WorkEnd { task, failure } => {
                if let Some(work) = self.entry(task).works.last_mut() {
                    work.status = if failure.is_some() {
                        TaskStatus::Error
                    } else {
                        TaskStatus::Done
                    };
                    work.failure = failure.clone();
                }
            }
            EventKind::SpawnStart { parent, children } => {
                for child in children {
                    self.entry(child);
                }
                let state = self.entry(parent);
                for child in children {
                    if !state.children.contains(child) {
                        state.children.push(child.clone());
                    }
                }
            }
            // Children report their own ends.
            EventKind::SpawnEnd { .. } => {}
            EventKind::TaskDependency { task, depends_on } => {
                let state = self.entry(task);
                if !state.dependencies.contains(depends_on) {
                    state.dependencies.push(depends_on.clone());
                }
            }
        }
    }

    pub fn apply_all<'a>(&mut self, events: impl IntoIterator<Item = &'a TaskEvent>) {
        for event in events {
            self.apply(event);
        }
    }

    pub fn get(&self, name: &str) -> Option<&TaskState> {
        self.states.get(name)
    }

    /// Task names in first-seen order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TaskState)> {
        self.order
            .iter()
            .filter_map(|name| self.states.get(name).map(|state| (name.as_str(), state)))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn summary(&self) -> BoardSummary {
        let mut summary = BoardSummary::default();
        for state in self.states.values() {
            match state.status {
                TaskStatus::Pending => summary.pending += 1,
                TaskStatus::Running => summary.running += 1,
                TaskStatus::Done => summary.done += 1,
                TaskStatus::Skipped => summary.skipped += 1,
                TaskStatus::Error => summary.error += 1,
            }
        }
        summary
    }

    fn entry(&mut self, name: &str) -> &mut TaskState {
        if !self.states.contains_key(name) {
            self.order.push(name.to_string());
        }
        self.states.entry(name.to_string()).or_default()
    }
}
