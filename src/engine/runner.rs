// src/engine/runner.rs

//! Drives a task body from `Pending` to a terminal state.
//!
//! The runner is the only code that changes a task's status. It emits
//! `TaskStart` right before the body is first polled and exactly one
//! `TaskEnd` once the body returns, fails or panics.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{Instrument, debug, info_span};

use crate::engine::bus::EventBus;
use crate::engine::event::{EndOutcome, EventKind};
use crate::engine::outcome::{TaskError, TaskResult};
use crate::engine::scope::Scope;
use crate::engine::task::Task;
use crate::errors::Result;
use crate::types::TaskStatus;

/// Claim the task's name on `bus`.
pub(crate) fn register<C, T>(bus: &EventBus, task: &Task<C, T>) -> Result<()> {
    bus.register(&task.name)
}

/// Run a registered task to settlement.
///
/// Boxed because bodies may call back into the runner through
/// `yield_task` / `spawn`.
pub(crate) fn drive<C, T>(
    task: Task<C, T>,
    bus: Arc<EventBus>,
    context: Arc<C>,
) -> BoxFuture<'static, TaskResult<T>>
where
    C: Send + Sync + 'static,
    T: Send + 'static,
{
    async move {
        let Task { name, body } = task;

        let started = bus.transition(
            &name,
            TaskStatus::Running,
            EventKind::TaskStart { name: name.clone() },
        );
        if !started {
            return TaskResult::Err(TaskError::msg(format!(
                "task '{name}' was not pending and cannot start"
            )));
        }

        debug!(task = %name, "task started");

        let scope = Scope::new(name.clone(), Arc::clone(&bus), context);
        let span = info_span!("task", name = %name);

        let settled = AssertUnwindSafe(async move { body(scope).await })
            .catch_unwind()
            .instrument(span)
            .await;

        let result = match settled {
            Ok(Ok(completion)) => TaskResult::from(completion),
            Ok(Err(err)) => TaskResult::Err(TaskError::from_anyhow(err)),
            Err(panic) => TaskResult::Err(TaskError::from_panic("task body", panic)),
        };

        match &result {
            TaskResult::Err(err) => debug!(task = %name, error = %format!("{err:#}"), "task failed"),
            other => debug!(task = %name, status = %other.status(), "task finished"),
        }

        let outcome = EndOutcome::from(&result);
        bus.transition(
            &name,
            result.status(),
            EventKind::TaskEnd {
                name: name.clone(),
                outcome,
            },
        );

        result
    }
    .boxed()
}
