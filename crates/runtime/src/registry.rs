//! Single-flight admission keyed by session.
//!
//! Each session owns one slot. A generation may only run while it holds
//! the slot of its session, so two generations for the same session can
//! never overlap. Sessions are created on first use and live as long as
//! the registry; only their slot cycles between empty and occupied.

use crate::task::{GenerationTask, TaskHandle, TaskId, TaskState, TaskStatus};
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};
use tcore::SessionKey;

/// Result of asking to start a generation.
pub enum Admission {
    /// The slot was free; the caller now owns this task.
    Started(GenerationTask),
    /// A generation is already running for the session.
    Busy,
}

impl Admission {
    /// Whether the request was rejected.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Result of asking to cancel the running generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The running task was asked to stop.
    Cancelled,
    /// No task was running.
    NothingToCancel,
}

/// What holds a session slot.
enum Occupant {
    Task(TaskHandle),
    Reserved(Arc<()>),
}

impl Occupant {
    fn task(&self) -> Option<&TaskHandle> {
        match self {
            Self::Task(task) => Some(task),
            Self::Reserved(_) => None,
        }
    }
}

#[derive(Default)]
struct Session {
    slot: Mutex<Option<Occupant>>,
}

/// Holds the slot of a session without running a generation.
///
/// Created by [`SessionRegistry::try_reserve`]. While it lives, new
/// generations for the session are turned away; dropping it frees the
/// slot.
pub struct Reservation {
    key: SessionKey,
    token: Arc<()>,
    registry: SessionRegistry,
}

impl Reservation {
    /// The reserved session.
    pub fn key(&self) -> &SessionKey {
        &self.key
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        let Some(session) = self.registry.lookup(&self.key) else {
            return;
        };
        let mut slot = session.slot.lock();
        if matches!(slot.as_ref(), Some(Occupant::Reserved(token)) if Arc::ptr_eq(token, &self.token)) {
            *slot = None;
            tracing::debug!(session = %self.key, "reservation released");
        }
    }
}

struct Registry {
    sessions: Mutex<BTreeMap<SessionKey, Arc<Session>>>,
    next_id: AtomicU64,
}

/// Maps each session to at most one active generation.
///
/// Cheap to clone; clones share the same sessions.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Registry>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Registry {
                sessions: Mutex::new(BTreeMap::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Start a generation for `key` unless one is already running.
    ///
    /// The check and the installation of the new task happen under the
    /// session's own lock. Sessions for other keys are not blocked.
    pub fn try_start(&self, key: &SessionKey) -> Admission {
        let session = self.session(key);
        let mut slot = session.slot.lock();
        if slot.is_some() {
            tracing::debug!(session = %key, "session busy");
            return Admission::Busy;
        }

        let id = TaskId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = TaskHandle::new(TaskState::new(id, key.clone()));
        *slot = Some(Occupant::Task(handle.clone()));
        drop(slot);

        tracing::debug!(session = %key, task = %id, "generation started");
        Admission::Started(GenerationTask::new(handle, self.clone()))
    }

    /// Hold the slot of `key` without starting a generation, unless the
    /// session is busy.
    pub fn try_reserve(&self, key: &SessionKey) -> Option<Reservation> {
        let session = self.session(key);
        let mut slot = session.slot.lock();
        if slot.is_some() {
            tracing::debug!(session = %key, "session busy");
            return None;
        }

        let token = Arc::new(());
        *slot = Some(Occupant::Reserved(token.clone()));
        Some(Reservation {
            key: key.clone(),
            token,
            registry: self.clone(),
        })
    }

    /// Ask the running generation of `key` to stop.
    ///
    /// Only sets the flag; the task stops the next time it checks it.
    pub fn cancel(&self, key: &SessionKey) -> CancelOutcome {
        match self.active(key) {
            Some(task) if task.status() == TaskStatus::Running => {
                task.request_cancel();
                tracing::info!(session = %key, task = %task.id(), "cancel requested");
                CancelOutcome::Cancelled
            }
            _ => CancelOutcome::NothingToCancel,
        }
    }

    /// Free the slot of `key` if it still holds `task`.
    ///
    /// Returns whether the slot was cleared. Releasing a task that was
    /// already replaced (for example after [`reset`](Self::reset)) does
    /// nothing.
    pub fn release(&self, key: &SessionKey, task: &TaskHandle) -> bool {
        let Some(session) = self.lookup(key) else {
            return false;
        };
        let mut slot = session.slot.lock();
        match slot.as_ref().and_then(Occupant::task) {
            Some(active) if active.same(task) => {
                *slot = None;
                tracing::debug!(session = %key, task = %task.id(), "slot released");
                true
            }
            _ => {
                tracing::debug!(session = %key, task = %task.id(), "stale release ignored");
                false
            }
        }
    }

    /// Forcibly empty the slot of `key`.
    ///
    /// The evicted task, if any, is asked to stop; its eventual release
    /// is ignored. Returns whether the slot was occupied.
    pub fn reset(&self, key: &SessionKey) -> bool {
        let Some(session) = self.lookup(key) else {
            return false;
        };
        let Some(evicted) = session.slot.lock().take() else {
            return false;
        };
        match evicted.task() {
            Some(task) => {
                task.request_cancel();
                tracing::warn!(session = %key, task = %task.id(), "session slot reset");
            }
            None => tracing::warn!(session = %key, "session reservation reset"),
        }
        true
    }

    /// The task currently holding the slot of `key`.
    pub fn active(&self, key: &SessionKey) -> Option<TaskHandle> {
        self.lookup(key)?.slot.lock().as_ref()?.task().cloned()
    }

    /// Whether a task or a reservation holds the slot of `key`.
    pub fn is_busy(&self, key: &SessionKey) -> bool {
        self.lookup(key)
            .is_some_and(|session| session.slot.lock().is_some())
    }

    /// Number of sessions seen so far.
    pub fn len(&self) -> usize {
        self.inner.sessions.lock().len()
    }

    /// Whether no session has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.inner.sessions.lock().is_empty()
    }

    fn lookup(&self, key: &SessionKey) -> Option<Arc<Session>> {
        self.inner.sessions.lock().get(key).cloned()
    }

    fn session(&self, key: &SessionKey) -> Arc<Session> {
        self.inner
            .sessions
            .lock()
            .entry(key.clone())
            .or_default()
            .clone()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
