// src/engine/outcome.rs

//! Task outcomes.
//!
//! - [`TaskResult`] is what a settled task produced: a value, a skip marker,
//!   or a failure cause. It is deliberately not a `Result`: a skip is neither
//!   success nor failure and callers must say what it means for them.
//! - [`Completion`] is what a task body returns on the non-failure path.
//! - [`TaskError`] is a cheaply cloneable failure cause shared between the
//!   result, the `TaskEnd` event and any parent that re-raises it.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use crate::types::TaskStatus;

/// Non-failure outcome of a task body (or of a sub-task awaited inline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion<T> {
    /// The body did its work and produced a value.
    Done(T),
    /// The body found its precondition already satisfied and did nothing.
    Skipped,
}

impl<T> Completion<T> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Completion::Skipped)
    }

    pub fn done(self) -> Option<T> {
        match self {
            Completion::Done(value) => Some(value),
            Completion::Skipped => None,
        }
    }
}

/// Settled outcome of a task.
#[must_use]
#[derive(Debug, Clone)]
pub enum TaskResult<T> {
    Ok(T),
    Skipped,
    Err(TaskError),
}

impl<T> TaskResult<T> {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskResult::Ok(_) => TaskStatus::Done,
            TaskResult::Skipped => TaskStatus::Skipped,
            TaskResult::Err(_) => TaskStatus::Error,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, TaskResult::Ok(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, TaskResult::Skipped)
    }

    pub fn is_err(&self) -> bool {
        matches!(self, TaskResult::Err(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            TaskResult::Ok(value) => Some(value),
            TaskResult::Skipped | TaskResult::Err(_) => None,
        }
    }

    pub fn err(&self) -> Option<&TaskError> {
        match self {
            TaskResult::Err(err) => Some(err),
            TaskResult::Ok(_) | TaskResult::Skipped => None,
        }
    }

    pub fn as_ref(&self) -> TaskResult<&T> {
        match self {
            TaskResult::Ok(value) => TaskResult::Ok(value),
            TaskResult::Skipped => TaskResult::Skipped,
            TaskResult::Err(err) => TaskResult::Err(err.clone()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> TaskResult<U> {
        match self {
            TaskResult::Ok(value) => TaskResult::Ok(f(value)),
            TaskResult::Skipped => TaskResult::Skipped,
            TaskResult::Err(err) => TaskResult::Err(err),
        }
    }

    /// Split into the body-level view: failures become `Err`, everything else
    /// a [`Completion`].
    pub fn into_completion(self) -> Result<Completion<T>, TaskError> {
        match self {
            TaskResult::Ok(value) => Ok(Completion::Done(value)),
            TaskResult::Skipped => Ok(Completion::Skipped),
            TaskResult::Err(err) => Err(err),
        }
    }
}

impl<T> From<Completion<T>> for TaskResult<T> {
    fn from(completion: Completion<T>) -> Self {
        match completion {
            Completion::Done(value) => TaskResult::Ok(value),
            Completion::Skipped => TaskResult::Skipped,
        }
    }
}

/// First failure among a set of sibling results, in declaration order.
///
/// Parents typically re-raise this after a `spawn` when any child failure
/// should fail the parent too.
pub fn first_failure<T>(results: &[TaskResult<T>]) -> Option<&TaskError> {
    results.iter().find_map(TaskResult::err)
}

/// Cloneable failure cause.
///
/// Displays and chains exactly like the wrapped `anyhow::Error`, so wrapping
/// it again while propagating through parents does not duplicate messages.
#[derive(Clone)]
pub struct TaskError(Arc<anyhow::Error>);

impl TaskError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self::new(anyhow::Error::msg(message))
    }

    /// Convert an error coming out of a task body, reusing the shared cause if
    /// the body just re-raised another task's failure.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<TaskError>() {
            Ok(shared) => shared,
            Err(err) => Self::new(err),
        }
    }

    pub(crate) fn from_panic(origin: &str, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Self::new(anyhow::anyhow!("{origin} panicked: {message}"))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Re-wrap as an `anyhow::Error` for `?` propagation inside a body.
    pub fn into_anyhow(self) -> anyhow::Error {
        anyhow::Error::new(self)
    }

    /// Search the cause chain, descending into nested task failures, for an
    /// error of type `E`.
    pub fn find<E: StdError + 'static>(&self) -> Option<&E> {
        for cause in self.0.chain() {
            if let Some(found) = cause.downcast_ref::<E>() {
                return Some(found);
            }
            if let Some(nested) = cause.downcast_ref::<TaskError>() {
                return nested.find::<E>();
            }
        }
        None
    }

    pub fn ptr_eq(&self, other: &TaskError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl StdError for TaskError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(err)
    }
}
