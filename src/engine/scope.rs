// src/engine/scope.rs

//! The handle a task body uses to suspend.
//!
//! Every suspension point of a body is one of the async methods here:
//! [`Scope::work`], [`Scope::yield_task`] or [`Scope::spawn`]. They all take
//! `&mut self`, so a body can never have two of them in flight at once and
//! its work units run strictly in request order.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use tracing::debug;

use crate::engine::bus::EventBus;
use crate::engine::event::EventKind;
use crate::engine::outcome::{Completion, TaskError, TaskResult};
use crate::engine::runner;
use crate::engine::task::Task;
use crate::engine::work::{self, WorkHandle};
use crate::types::TaskName;

pub struct Scope<C> {
    name: TaskName,
    bus: Arc<EventBus>,
    context: Arc<C>,
}

impl<C> Scope<C>
where
    C: Send + Sync + 'static,
{
    pub(crate) fn new(name: TaskName, bus: Arc<EventBus>, context: Arc<C>) -> Self {
        Self { name, bus, context }
    }

    /// Name of the task this scope belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The session context shared by every task of the run.
    pub fn context(&self) -> &C {
        &self.context
    }

    pub fn context_handle(&self) -> Arc<C> {
        Arc::clone(&self.context)
    }

    /// Run one work unit with no initial description.
    ///
    /// The step's error comes back here unchanged; nothing is retried.
    pub async fn work<T, F, Fut>(&mut self, step: F) -> anyhow::Result<T>
    where
        F: FnOnce(WorkHandle<C>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        work::execute(&self.name, &self.bus, &self.context, None, step).await
    }

    /// Run one work unit whose `WorkStart` already carries a description.
    pub async fn work_with<T, F, Fut>(
        &mut self,
        description: impl Into<String>,
        step: F,
    ) -> anyhow::Result<T>
    where
        F: FnOnce(WorkHandle<C>) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        work::execute(
            &self.name,
            &self.bus,
            &self.context,
            Some(description.into()),
            step,
        )
        .await
    }

    /// Run `child` to completion and hand back its outcome.
    ///
    /// Records `TaskDependency(self, child)` before the child starts. A
    /// child failure is returned as an error carrying the child's
    /// [`TaskError`], so `?` fails this task with the same cause.
    pub async fn yield_task<T>(&mut self, child: Task<C, T>) -> anyhow::Result<Completion<T>>
    where
        T: Send + 'static,
    {
        runner::register(&self.bus, &child)?;
        self.declare_dependency(child.name.clone());

        runner::drive(child, Arc::clone(&self.bus), Arc::clone(&self.context))
            .await
            .into_completion()
            .map_err(TaskError::into_anyhow)
    }

    /// Run all `children` concurrently and wait for every one of them.
    ///
    /// Results come back in declaration order. A failing child never
    /// cancels its siblings; deciding what a failure means is up to the
    /// caller (see [`first_failure`](crate::engine::first_failure)).
    ///
    /// A child whose name is already in use on this stream is not started;
    /// its slot holds the duplicate-name error and it is left out of
    /// `SpawnStart`.
    pub async fn spawn<T>(&mut self, children: Vec<Task<C, T>>) -> Vec<TaskResult<T>>
    where
        T: Send + 'static,
    {
        let mut slots: Vec<Option<TaskResult<T>>> = Vec::with_capacity(children.len());
        let mut accepted = Vec::new();

        for (index, child) in children.into_iter().enumerate() {
            match runner::register(&self.bus, &child) {
                Ok(()) => {
                    slots.push(None);
                    accepted.push((index, child));
                }
                Err(err) => {
                    debug!(task = %self.name, child = %child.name, error = %err, "child rejected");
                    slots.push(Some(TaskResult::Err(TaskError::new(err.into()))));
                }
            }
        }

        self.bus.emit(EventKind::SpawnStart {
            parent: self.name.clone(),
            children: accepted.iter().map(|(_, child)| child.name.clone()).collect(),
        });

        let running = accepted.into_iter().map(|(index, child)| {
            runner::drive(child, Arc::clone(&self.bus), Arc::clone(&self.context))
                .map(move |result| (index, result))
        });

        for (index, result) in join_all(running).await {
            slots[index] = Some(result);
        }

        self.bus.emit(EventKind::SpawnEnd {
            parent: self.name.clone(),
        });

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| TaskResult::Err(TaskError::msg("child task never settled")))
            })
            .collect()
    }

    /// Declare that this task depends on the result of `task`, which was
    /// obtained some other way (for example from another [`TaskRun`]).
    ///
    /// [`TaskRun`]: crate::engine::TaskRun
    pub fn depends_on(&mut self, task: impl Into<TaskName>) {
        self.declare_dependency(task.into());
    }

    fn declare_dependency(&self, depends_on: TaskName) {
        self.bus.emit(EventKind::TaskDependency {
            task: self.name.clone(),
            depends_on,
        });
    }
}
