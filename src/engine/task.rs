// src/engine/task.rs

//! Task definitions.

use std::fmt;
use std::future::Future;

use futures::future::BoxFuture;

use crate::engine::outcome::Completion;
use crate::engine::scope::Scope;
use crate::types::TaskName;

pub(crate) type TaskBody<C, T> =
    Box<dyn FnOnce(Scope<C>) -> BoxFuture<'static, anyhow::Result<Completion<T>>> + Send>;

/// A named unit of orchestration that has not started yet.
///
/// Creating a task does nothing; its body only runs once it is handed to
/// [`Session::run_task`](crate::engine::Session::run_task),
/// [`Scope::yield_task`] or [`Scope::spawn`].
pub struct Task<C, T> {
    pub(crate) name: TaskName,
    pub(crate) body: TaskBody<C, T>,
}

impl<C, T> Task<C, T> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<C, T> fmt::Debug for Task<C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Define a task from an async body.
///
/// The body receives its [`Scope`] by value and suspends only where it
/// awaits one of the scope's operations.
///
/// ```no_run
/// use crawlflow::engine::{task, Completion, Scope, Task};
///
/// fn greet() -> Task<(), String> {
///     task("greet", |mut scope: Scope<()>| async move {
///         let text = scope
///             .work(|w| async move {
///                 w.description("Composing greeting");
///                 Ok("hello".to_string())
///             })
///             .await?;
///         Ok(Completion::Done(text))
///     })
/// }
/// ```
pub fn task<C, T, F, Fut>(name: impl Into<TaskName>, body: F) -> Task<C, T>
where
    C: Send + Sync + 'static,
    F: FnOnce(Scope<C>) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Completion<T>>> + Send + 'static,
{
    Task {
        name: name.into(),
        body: Box::new(move |scope| Box::pin(body(scope))),
    }
}
