// src/engine/bus.rs

//! Append-only, multi-subscriber event log for one task tree.
//!
//! The bus also owns the status of every task registered on it. A status
//! change and the event announcing it are applied under the same lock, so no
//! subscriber can observe a state without its event (or the other way round).
//!
//! Buffering: every event is kept until the bus is dropped and each subscriber
//! only holds a cursor into the shared log. Slow or idle subscribers therefore
//! never back-pressure the producer. The log is unbounded; a warning is logged
//! once when it grows past the configured threshold.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::Stream;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::engine::event::{EventKind, TaskEvent};
use crate::errors::{CrawlflowError, Result};
use crate::types::{TaskName, TaskStatus};

/// Default number of buffered events after which the bus warns once.
pub const DEFAULT_EVENT_WARN_THRESHOLD: usize = 50_000;

#[derive(Debug, Default)]
struct BusState {
    events: Vec<TaskEvent>,
    statuses: HashMap<TaskName, TaskStatus>,
    closed: bool,
    warned: bool,
}

#[derive(Debug)]
pub struct EventBus {
    state: Mutex<BusState>,
    notify: Notify,
    warn_threshold: usize,
    /// Names taken across every bus of the owning session.
    session_names: Arc<Mutex<HashSet<TaskName>>>,
}

impl EventBus {
    pub fn new(warn_threshold: usize) -> Self {
        Self::with_session_names(warn_threshold, Arc::default())
    }

    /// A bus whose task names must also be unique within `session_names`.
    pub fn with_session_names(
        warn_threshold: usize,
        session_names: Arc<Mutex<HashSet<TaskName>>>,
    ) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            notify: Notify::new(),
            warn_threshold: warn_threshold.max(1),
            session_names,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a task name as `Pending`.
    ///
    /// Fails if the name is already used anywhere in the session.
    pub(crate) fn register(&self, name: &str) -> Result<()> {
        let mut state = self.lock();
        let mut session_names = self
            .session_names
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if state.statuses.contains_key(name) || !session_names.insert(name.to_string()) {
            return Err(CrawlflowError::DuplicateTask(name.to_string()));
        }
        drop(session_names);
        state.statuses.insert(name.to_string(), TaskStatus::Pending);
        debug!(task = %name, "registered task");
        Ok(())
    }

    /// Move `name` to `next` and append `kind` atomically.
    ///
    /// Illegal transitions (including anything out of a terminal state) are
    /// dropped and reported as `false`.
    pub(crate) fn transition(&self, name: &str, next: TaskStatus, kind: EventKind) -> bool {
        let mut state = self.lock();
        let current = state.statuses.get(name).copied();

        match current {
            Some(current) if current.can_transition_to(next) => {
                state.statuses.insert(name.to_string(), next);
                self.append(&mut state, kind);
                true
            }
            Some(current) => {
                warn!(task = %name, from = %current, to = %next, "illegal task transition; dropping event");
                false
            }
            None => {
                warn!(task = %name, to = %next, "transition for unregistered task; dropping event");
                false
            }
        }
    }

    /// Append an event owned by a running task.
    ///
    /// Events for tasks that are not `Running` are dropped and reported as
    /// `false`; this is what guarantees nothing follows a `TaskEnd`.
    pub(crate) fn emit(&self, kind: EventKind) -> bool {
        let mut state = self.lock();
        let owner_status = state.statuses.get(kind.owner()).copied();

        if owner_status != Some(TaskStatus::Running) {
            debug!(
                task = %kind.owner(),
                event = kind.label(),
                status = ?owner_status,
                "owner task is not running; dropping event"
            );
            return false;
        }

        self.append(&mut state, kind);
        true
    }

    fn append(&self, state: &mut BusState, kind: EventKind) {
        let seq = state.events.len() as u64;
        state.events.push(TaskEvent {
            seq,
            at: Utc::now(),
            kind,
        });

        if !state.warned && state.events.len() >= self.warn_threshold {
            state.warned = true;
            warn!(
                buffered = state.events.len(),
                threshold = self.warn_threshold,
                "event stream is large; all events stay buffered until the stream is dropped"
            );
        }

        self.notify.notify_waiters();
    }

    /// Mark the stream as finished. Subscribers drain what is buffered and
    /// then see the end of the stream.
    pub(crate) fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            debug!(events = state.events.len(), "event stream closed");
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// New subscriber positioned at the start of the log.
    pub fn subscribe(self: &Arc<Self>) -> EventStream {
        EventStream {
            bus: Arc::clone(self),
            cursor: 0,
        }
    }
}

/// Independent reader over an [`EventBus`].
///
/// Dropping a stream has no effect on execution.
#[derive(Debug)]
pub struct EventStream {
    bus: Arc<EventBus>,
    cursor: usize,
}

impl EventStream {
    /// Next event, waiting for one to be produced. Returns `None` once the
    /// stream is closed and fully drained.
    pub async fn next(&mut self) -> Option<TaskEvent> {
        let bus = Arc::clone(&self.bus);
        loop {
            let notified = bus.notify.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent append
            // between the check and the await is not missed.
            notified.as_mut().enable();

            match self.poll_buffered() {
                Polled::Event(event) => return Some(event),
                Polled::Closed => return None,
                Polled::Empty => notified.await,
            }
        }
    }

    /// Next buffered event without waiting.
    pub fn try_next(&mut self) -> Option<TaskEvent> {
        match self.poll_buffered() {
            Polled::Event(event) => Some(event),
            Polled::Closed | Polled::Empty => None,
        }
    }

    /// Drain the whole stream, waiting until it is closed.
    pub async fn collect_all(mut self) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = TaskEvent> + Send {
        futures::stream::unfold(self, |mut stream| async move {
            stream.next().await.map(|event| (event, stream))
        })
    }

    fn poll_buffered(&mut self) -> Polled {
        let state = self.bus.lock();
        if let Some(event) = state.events.get(self.cursor) {
            self.cursor += 1;
            Polled::Event(event.clone())
        } else if state.closed {
            Polled::Closed
        } else {
            Polled::Empty
        }
    }
}

enum Polled {
    Event(TaskEvent),
    Closed,
    Empty,
}
