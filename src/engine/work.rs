// src/engine/work.rs

//! Work unit execution.
//!
//! A work unit wraps exactly one asynchronous step of a task. The executor
//! emits `WorkStart` before the step is polled and `WorkEnd` once it settles.
//! While the step runs it may report a description or progress through its
//! [`WorkHandle`]; each call is emitted immediately.
//!
//! There is no implicit retry. A failed step is returned to the task body,
//! which can recover, loop, or let the error fail the task.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::FutureExt;
use tracing::{debug, warn};

use crate::engine::bus::EventBus;
use crate::engine::event::EventKind;
use crate::engine::outcome::TaskError;
use crate::types::{ProgressValue, TaskName};

/// Reporting handle given to a running work unit.
pub struct WorkHandle<C> {
    task: TaskName,
    bus: Arc<EventBus>,
    context: Arc<C>,
    last_count: AtomicU64,
    settled: Arc<AtomicBool>,
}

impl<C> WorkHandle<C> {
    /// Name of the task that owns this work unit.
    pub fn task(&self) -> &str {
        &self.task
    }

    /// The session context, for collaborators needed inside the step.
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_handle(&self) -> Arc<C> {
        Arc::clone(&self.context)
    }

    /// Replace the human-readable description of this step.
    pub fn description(&self, text: impl Into<String>) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }
        self.bus.emit(EventKind::WorkDescription {
            task: self.task.clone(),
            description: text.into(),
        });
    }

    /// Report progress. Counts that go backwards are ignored.
    pub fn progress(&self, value: ProgressValue) {
        if self.settled.load(Ordering::Acquire) {
            return;
        }

        let value = match value {
            ProgressValue::Count(n) => {
                let previous = self.last_count.fetch_max(n, Ordering::AcqRel);
                if n < previous {
                    warn!(task = %self.task, count = n, previous, "progress count went backwards; ignoring");
                    return;
                }
                ProgressValue::Count(n)
            }
            ProgressValue::Ratio(r) => ProgressValue::ratio(r),
            ProgressValue::Indefinite => ProgressValue::Indefinite,
        };

        self.bus.emit(EventKind::WorkProgress {
            task: self.task.clone(),
            value,
        });
    }
}

/// Run one work unit for `task`, bracketing it with `WorkStart` / `WorkEnd`.
pub(crate) async fn execute<C, T, F, Fut>(
    task: &str,
    bus: &Arc<EventBus>,
    context: &Arc<C>,
    description: Option<String>,
    step: F,
) -> anyhow::Result<T>
where
    F: FnOnce(WorkHandle<C>) -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let settled = Arc::new(AtomicBool::new(false));
    let handle = WorkHandle {
        task: task.to_string(),
        bus: Arc::clone(bus),
        context: Arc::clone(context),
        last_count: AtomicU64::new(0),
        settled: Arc::clone(&settled),
    };

    bus.emit(EventKind::WorkStart {
        task: task.to_string(),
        description,
    });

    let result = match AssertUnwindSafe(async move { step(handle).await })
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(TaskError::from_panic("work unit", panic).into_anyhow()),
    };

    settled.store(true, Ordering::Release);

    let failure = match &result {
        Ok(_) => None,
        Err(err) => {
            debug!(task = %task, error = %format!("{err:#}"), "work unit failed");
            Some(format!("{err:#}"))
        }
    };

    bus.emit(EventKind::WorkEnd {
        task: task.to_string(),
        failure,
    });

    result
}
