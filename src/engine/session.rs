// src/engine/session.rs

//! Sessions: the root every task tree is launched from.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::engine::bus::{DEFAULT_EVENT_WARN_THRESHOLD, EventBus, EventStream};
use crate::engine::outcome::{TaskError, TaskResult};
use crate::engine::runner;
use crate::engine::task::Task;
use crate::types::TaskName;

/// Engine knobs that apply to every run of a session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Buffered events per stream after which a warning is logged once.
    pub event_warn_threshold: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            event_warn_threshold: DEFAULT_EVENT_WARN_THRESHOLD,
        }
    }
}

/// Per-run container for the shared context.
///
/// The context is frozen behind an `Arc` when the session is created and is
/// handed to every task launched from it.
pub struct Session<C> {
    context: Arc<C>,
    tracker: TaskTracker,
    settings: SessionSettings,
    /// Every task name registered by any run of this session.
    names: Arc<Mutex<HashSet<TaskName>>>,
}

impl<C> Session<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(context: C) -> Self {
        Self::with_settings(context, SessionSettings::default())
    }

    pub fn with_settings(context: C, settings: SessionSettings) -> Self {
        Self {
            context: Arc::new(context),
            tracker: TaskTracker::new(),
            settings,
            names: Arc::default(),
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    /// Launch `task` as the root of a new event stream.
    ///
    /// The task starts running immediately on the tokio runtime; the returned
    /// [`TaskRun`] gives access to its events and its result. A name already
    /// used by any earlier run of this session (root or child) fails the run
    /// with [`CrawlflowError::DuplicateTask`](crate::errors::CrawlflowError).
    pub fn run_task<T>(&self, task: Task<C, T>) -> TaskRun<T>
    where
        T: Send + 'static,
    {
        let bus = Arc::new(EventBus::with_session_names(
            self.settings.event_warn_threshold,
            Arc::clone(&self.names),
        ));
        let name = task.name.clone();
        let registered = runner::register(&bus, &task);

        let run_bus = Arc::clone(&bus);
        let context = Arc::clone(&self.context);

        let handle = self.tracker.spawn(async move {
            let _close = CloseOnDrop(Arc::clone(&run_bus));
            match registered {
                Ok(()) => runner::drive(task, run_bus, context).await,
                Err(err) => TaskResult::Err(TaskError::new(err.into())),
            }
        });

        debug!(task = %name, "launched root task");
        TaskRun { name, bus, handle }
    }

    /// Wait for every task launched from this session to settle.
    pub async fn shutdown(self) {
        self.tracker.close();
        debug!(running = self.tracker.len(), "waiting for session tasks");
        self.tracker.wait().await;
    }
}

/// Closes the stream once the root future finishes, however it finishes.
struct CloseOnDrop(Arc<EventBus>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// A running root task.
pub struct TaskRun<T> {
    name: TaskName,
    bus: Arc<EventBus>,
    handle: JoinHandle<TaskResult<T>>,
}

impl<T> TaskRun<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// A new subscriber that replays the stream from its first event.
    ///
    /// Can be called any number of times; dropping a subscriber has no
    /// effect on the run.
    pub fn events(&self) -> EventStream {
        self.bus.subscribe()
    }

    /// Wait for the root task to settle.
    pub async fn result(self) -> TaskResult<T> {
        match self.handle.await {
            Ok(result) => result,
            Err(err) => {
                warn!(task = %self.name, error = %err, "root task did not complete");
                TaskResult::Err(TaskError::msg(format!(
                    "task '{}' did not complete: {err}",
                    self.name
                )))
            }
        }
    }
}

/// Await several runs, pairing each result with its task name.
///
/// Results keep the order of `runs`, so isolated failures can be logged
/// while the rest are used.
pub async fn join_runs<T>(runs: Vec<TaskRun<T>>) -> Vec<(TaskName, TaskResult<T>)> {
    let pending = runs.into_iter().map(|run| async move {
        let name = run.name.clone();
        (name, run.result().await)
    });
    futures::future::join_all(pending).await
}
