// src/engine/mod.rs

//! Task/work orchestration engine.
//!
//! A [`Task`] is a named async body. Launched from a [`Session`], it runs on
//! the tokio runtime and suspends only at the operations of its [`Scope`]:
//! - [`Scope::work`] wraps one fallible async step and reports on it,
//! - [`Scope::yield_task`] runs a sub-task inline and records the dependency,
//! - [`Scope::spawn`] runs sibling sub-tasks concurrently and waits for all.
//!
//! Everything that happens is appended to an [`EventStream`] shared by the
//! whole task tree of one run.

pub mod bus;
pub mod event;
pub mod outcome;
pub mod runner;
pub mod scope;
pub mod session;
pub mod task;
pub mod work;

pub use bus::{DEFAULT_EVENT_WARN_THRESHOLD, EventBus, EventStream};
pub use event::{EndOutcome, EventKind, TaskEvent};
pub use outcome::{Completion, TaskError, TaskResult, first_failure};
pub use scope::Scope;
pub use session::{Session, SessionSettings, TaskRun, join_runs};
pub use task::{Task, task};
pub use work::WorkHandle;
