//! One generation attempt, from admission to terminal status.

use crate::registry::SessionRegistry;
use anyhow::Context;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tcore::{
    Backend, ContextWindow, Delivery, DialogTurn, DisplayUpdate, Emit, SessionKey, Sink,
    StreamCoalescer, StreamConfig, Usage, UserContent,
};

/// Identifier of one generation attempt, unique within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub(crate) u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle of a generation. Every status but `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Still consuming backend output.
    Running,
    /// Stopped after a cancel request.
    Cancelled,
    /// The backend stream ended normally.
    Completed,
    /// The backend or the transport failed.
    Failed,
}

impl TaskStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        self != Self::Running
    }
}

/// The terminal result of a generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The attempt this outcome belongs to.
    pub task: TaskId,
    /// Terminal status.
    pub status: TaskStatus,
    /// The answer as last seen. A completed answer is cut to the
    /// transport limit.
    pub text: String,
    /// Token usage up to the last consumed chunk.
    pub usage: Usage,
    /// Oldest turns dropped from the dialog to fit the new one.
    pub evicted: usize,
    /// Why the generation failed.
    pub failure: Option<String>,
    /// Whether the idle timeout started a new dialog before this turn.
    pub fresh_dialog: bool,
    /// Why the dialog or the usage could not be stored afterwards.
    pub store_error: Option<String>,
}

struct Progress {
    status: TaskStatus,
    usage: Usage,
}

/// Shared state of a task, visible through [`TaskHandle`].
pub(crate) struct TaskState {
    id: TaskId,
    key: SessionKey,
    cancel: AtomicBool,
    progress: Mutex<Progress>,
}

impl TaskState {
    pub(crate) fn new(id: TaskId, key: SessionKey) -> Self {
        Self {
            id,
            key,
            cancel: AtomicBool::new(false),
            progress: Mutex::new(Progress {
                status: TaskStatus::Running,
                usage: Usage::default(),
            }),
        }
    }

    /// Record cumulative usage. Counters never go down and freeze once
    /// the task is terminal.
    fn commit(&self, usage: Usage) {
        let mut progress = self.progress.lock();
        if progress.status.is_terminal() {
            return;
        }
        progress.usage.input_tokens = progress.usage.input_tokens.max(usage.input_tokens);
        progress.usage.output_tokens = progress.usage.output_tokens.max(usage.output_tokens);
    }

    /// Move to `status` if still running; returns the status in effect.
    fn finish(&self, status: TaskStatus) -> TaskStatus {
        let mut progress = self.progress.lock();
        if !progress.status.is_terminal() {
            progress.status = status;
        }
        progress.status
    }
}

/// Read-only view of a task plus its cancel switch.
#[derive(Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(state: TaskState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// The attempt identifier.
    pub fn id(&self) -> TaskId {
        self.state.id
    }

    /// The owning session.
    pub fn key(&self) -> &SessionKey {
        &self.state.key
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.state.progress.lock().status
    }

    /// Token usage committed so far.
    pub fn usage(&self) -> Usage {
        self.state.progress.lock().usage
    }

    /// Whether a cancel was requested.
    pub fn is_cancel_requested(&self) -> bool {
        self.state.cancel.load(Ordering::Acquire)
    }

    /// Ask the task to stop. Returns false if it was already asked.
    pub(crate) fn request_cancel(&self) -> bool {
        !self.state.cancel.swap(true, Ordering::AcqRel)
    }

    /// Whether both handles point at the same attempt.
    pub fn same(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("key", self.key())
            .field("status", &self.status())
            .finish()
    }
}

/// A generation attempt holding the slot of its session.
///
/// Created by [`SessionRegistry::try_start`]. Dropping the task releases
/// the slot, so the slot is freed exactly once on every exit path,
/// including when the future driving [`run`](Self::run) is aborted.
pub struct GenerationTask {
    handle: TaskHandle,
    registry: SessionRegistry,
}

impl GenerationTask {
    pub(crate) fn new(handle: TaskHandle, registry: SessionRegistry) -> Self {
        Self { handle, registry }
    }

    /// The attempt identifier.
    pub fn id(&self) -> TaskId {
        self.handle.id()
    }

    /// The owning session.
    pub fn key(&self) -> &SessionKey {
        self.handle.key()
    }

    /// Current status.
    pub fn status(&self) -> TaskStatus {
        self.handle.status()
    }

    /// A handle for observing the task from elsewhere.
    pub fn handle(&self) -> TaskHandle {
        self.handle.clone()
    }

    /// Drive the backend stream to a terminal status.
    ///
    /// Partial output goes through a [`StreamCoalescer`] and emitted
    /// updates are delivered to `sink` in order. The cancel flag is checked
    /// before every request for the next chunk. On completion the turn is
    /// appended to `window`; on cancellation or failure the window is left
    /// as it was. Usage reported up to the last consumed chunk is kept in
    /// every case.
    pub async fn run<B, S>(
        &mut self,
        backend: &B,
        window: &mut ContextWindow,
        message: &UserContent,
        sink: &S,
        config: &StreamConfig,
    ) -> Outcome
    where
        B: Backend,
        S: Sink,
    {
        if self.status().is_terminal() {
            return self.outcome(String::new(), 0, None);
        }

        let history = window.snapshot();
        let mut coalescer = StreamCoalescer::from(config);
        let mut text = String::new();

        let stream = backend.generate(&history, message);
        futures_util::pin_mut!(stream);

        let ended = loop {
            if self.handle.is_cancel_requested() {
                break Ok(TaskStatus::Cancelled);
            }

            match stream.next().await {
                None => break Ok(TaskStatus::Completed),
                Some(Err(e)) => break Err(e.context("backend failed")),
                Some(Ok(partial)) => {
                    self.handle.state.commit(partial.usage);
                    text = partial.text;
                    if let Emit::Emit(update) = coalescer.offer(&text, false) {
                        if let Err(e) = deliver(sink, update, config.edit_interval()).await {
                            break Err(e);
                        }
                    }
                }
            }
        };

        let ended = match ended {
            Ok(TaskStatus::Completed) => match coalescer.offer(&text, true) {
                Emit::Emit(update) => {
                    text = update.content.clone();
                    deliver(sink, update, Duration::ZERO)
                        .await
                        .map(|_| TaskStatus::Completed)
                }
                Emit::Suppress => Ok(TaskStatus::Completed),
            },
            other => other,
        };

        let (status, failure) = match ended {
            Ok(status) => (status, None),
            Err(e) => (TaskStatus::Failed, Some(format!("{e:#}"))),
        };

        let status = self.handle.state.finish(status);
        let evicted = if status == TaskStatus::Completed {
            window.append(DialogTurn::new(message.clone(), text.clone()))
        } else {
            0
        };

        let outcome = self.outcome(text, evicted, failure);
        match outcome.status {
            TaskStatus::Failed => tracing::warn!(
                session = %self.key(),
                task = %outcome.task,
                input_tokens = outcome.usage.input_tokens,
                output_tokens = outcome.usage.output_tokens,
                reason = outcome.failure.as_deref().unwrap_or_default(),
                "generation failed"
            ),
            status => tracing::info!(
                session = %self.key(),
                task = %outcome.task,
                ?status,
                input_tokens = outcome.usage.input_tokens,
                output_tokens = outcome.usage.output_tokens,
                evicted,
                "generation finished"
            ),
        }
        outcome
    }

    fn outcome(&self, text: String, evicted: usize, failure: Option<String>) -> Outcome {
        Outcome {
            task: self.id(),
            status: self.status(),
            text,
            usage: self.handle.usage(),
            evicted,
            failure,
            fresh_dialog: false,
            store_error: None,
        }
    }
}

impl Drop for GenerationTask {
    fn drop(&mut self) {
        if !self.status().is_terminal() {
            self.handle.state.finish(TaskStatus::Cancelled);
            tracing::debug!(session = %self.key(), task = %self.id(), "task dropped while running");
        }
        self.registry.release(self.handle.key(), &self.handle);
    }
}

async fn deliver<S: Sink>(sink: &S, update: DisplayUpdate, pause: Duration) -> anyhow::Result<()> {
    let is_final = update.is_final;
    match sink.deliver(update).await.context("delivery failed")? {
        Delivery::Applied => {}
        Delivery::Unchanged => tracing::trace!(is_final, "display already up to date"),
    }

    if !is_final && !pause.is_zero() {
        tokio::time::sleep(pause).await;
    }
    Ok(())
}
