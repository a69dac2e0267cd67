// src/telemetry/reporter.rs

//! Turns an event stream into log lines.

use tracing::{debug, error, info, warn};

use crate::engine::{EndOutcome, EventKind, EventStream, TaskEvent};
use crate::telemetry::board::TaskBoard;
use crate::telemetry::format::{format_duration, format_error, format_progress};
use crate::telemetry::sort::sort_by_dependencies;

/// Log every event of `events` until the stream closes, then log a summary.
///
/// Returns the folded board so callers can inspect the final state.
pub async fn report(mut events: EventStream) -> TaskBoard {
    let mut board = TaskBoard::new();
    while let Some(event) = events.next().await {
        log_event(&event);
        board.apply(&event);
    }
    log_summary(&board);
    board
}

pub fn log_event(event: &TaskEvent) {
    match &event.kind {
        EventKind::TaskStart { name } => info!(task = %name, "started"),
        EventKind::TaskEnd { name, outcome } => match outcome {
            EndOutcome::Done => info!(task = %name, "done"),
            EndOutcome::Skipped => info!(task = %name, "skipped"),
            EndOutcome::Failed(err) => error!(task = %name, error = %format_error(err), "failed"),
        },
        EventKind::WorkStart { task, description } => match description {
            Some(text) => info!(task = %task, "{text}"),
            None => debug!(task = %task, "work started"),
        },
        EventKind::WorkDescription { task, description } => info!(task = %task, "{description}"),
        EventKind::WorkProgress { task, value } => {
            debug!(task = %task, progress = %format_progress(value), "progress")
        }
        EventKind::WorkEnd { task, failure } => match failure {
            Some(failure) => warn!(task = %task, error = %failure, "work unit failed"),
            None => debug!(task = %task, "work finished"),
        },
        EventKind::SpawnStart { parent, children } => {
            info!(task = %parent, children = ?children, "spawned {} sub-tasks", children.len())
        }
        EventKind::SpawnEnd { parent } => debug!(task = %parent, "all sub-tasks settled"),
        EventKind::TaskDependency { task, depends_on } => {
            debug!(task = %task, depends_on = %depends_on, "dependency")
        }
    }
}

pub fn log_summary(board: &TaskBoard) {
    let summary = board.summary();
    info!(
        total = summary.total(),
        done = summary.done,
        skipped = summary.skipped,
        failed = summary.error,
        "run finished"
    );

    for name in sort_by_dependencies(board) {
        let Some(state) = board.get(&name) else {
            continue;
        };
        let elapsed = state
            .elapsed()
            .and_then(|d| d.to_std().ok())
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());
        match &state.error {
            Some(err) => info!(task = %name, status = %state.status, elapsed = %elapsed, error = %format_error(err), "summary"),
            None => info!(task = %name, status = %state.status, elapsed = %elapsed, "summary"),
        }
    }
}
