//! Turnstile runtime: one generation per session at a time.
//!
//! The [`Runtime`] is the entry point. It owns the [`SessionRegistry`],
//! the model backend, the dialog store and the configuration, and turns
//! chat-level requests (a new message, a retry, a cancel, a new dialog)
//! into admitted [`GenerationTask`]s.
//!
//! # Example
//!
//! ```rust,ignore
//! use turnstile_runtime::{Runtime, Submission};
//! use tcore::{Config, InMemoryStore, SessionKey, UserContent};
//!
//! let runtime = Runtime::new(Config::default(), backend, InMemoryStore::new());
//! let key = SessionKey::dm("42");
//! match runtime.submit(&key, UserContent::text("hello"), &sink).await? {
//!     Submission::Busy => println!("please wait or /cancel"),
//!     Submission::Finished(outcome) => println!("{}", outcome.text),
//!     _ => {}
//! }
//! ```

pub use registry::{Admission, CancelOutcome, Reservation, SessionRegistry};
pub use task::{GenerationTask, Outcome, TaskHandle, TaskId, TaskStatus};

use anyhow::Result;
use chrono::Utc;
use tcore::{Backend, Config, ContextWindow, DialogStore, SessionKey, Sink, UserContent};

mod registry;
mod task;

/// What happened to a message or retry request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// The message had no text and no image.
    Empty,
    /// A generation is already running for the session.
    Busy,
    /// A retry was asked for but the dialog has no turn.
    EmptyWindow,
    /// The generation ran to a terminal status.
    Finished(Outcome),
}

/// What happened to a new-dialog request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewDialog {
    /// The dialog was cleared.
    Started,
    /// A generation is running; nothing was changed.
    Busy,
}

/// The session runtime.
///
/// Admission control for quotas happens before any of these calls; the
/// runtime only arbitrates concurrency within a session.
pub struct Runtime<B: Backend, S: DialogStore> {
    registry: SessionRegistry,
    backend: B,
    store: S,
    config: Config,
}

impl<B: Backend, S: DialogStore> Runtime<B, S> {
    /// Create a new runtime.
    pub fn new(config: Config, backend: B, store: S) -> Self {
        Self {
            registry: SessionRegistry::new(),
            backend,
            store,
            config,
        }
    }

    /// The session registry.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The dialog store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The model backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The configuration in effect.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer a new user message in `key`'s dialog.
    ///
    /// If the dialog has been idle longer than the configured timeout it
    /// is cleared first and the outcome is marked as a fresh dialog.
    pub async fn submit<K: Sink>(
        &self,
        key: &SessionKey,
        content: UserContent,
        sink: &K,
    ) -> Result<Submission> {
        if content.is_empty() {
            return Ok(Submission::Empty);
        }
        let Admission::Started(mut task) = self.registry.try_start(key) else {
            return Ok(Submission::Busy);
        };

        let mut window = self.load(key).await?;
        let mut fresh_dialog = false;
        if let Some(timeout) = self.config.session.idle_timeout() {
            if window.is_idle(Utc::now(), timeout) {
                tracing::info!(session = %key, turns = window.len(), "dialog timed out, starting a new one");
                window.clear();
                self.store.save(key, Vec::new()).await?;
                fresh_dialog = true;
            }
        }

        let mut outcome = self.generate(&mut task, window, &content, sink).await;
        outcome.fresh_dialog = fresh_dialog;
        Ok(Submission::Finished(outcome))
    }

    /// Drop the last turn of `key`'s dialog and answer its message again.
    ///
    /// The idle timeout does not apply to retries.
    pub async fn retry<K: Sink>(&self, key: &SessionKey, sink: &K) -> Result<Submission> {
        let Admission::Started(mut task) = self.registry.try_start(key) else {
            return Ok(Submission::Busy);
        };

        let mut window = self.load(key).await?;
        let Ok(last) = window.drop_last() else {
            return Ok(Submission::EmptyWindow);
        };
        self.store.save(key, window.snapshot()).await?;

        tracing::debug!(session = %key, task = %task.id(), "retrying last message");
        let outcome = self.generate(&mut task, window, &last.user, sink).await;
        Ok(Submission::Finished(outcome))
    }

    /// Ask the running generation of `key` to stop.
    pub fn cancel(&self, key: &SessionKey) -> CancelOutcome {
        self.registry.cancel(key)
    }

    /// Clear `key`'s dialog.
    pub async fn new_dialog(&self, key: &SessionKey) -> Result<NewDialog> {
        // holding the slot keeps generations out while the dialog is reset
        let Some(_reservation) = self.registry.try_reserve(key) else {
            return Ok(NewDialog::Busy);
        };
        self.store.save(key, Vec::new()).await?;
        tracing::info!(session = %key, "new dialog started");
        Ok(NewDialog::Started)
    }

    async fn load(&self, key: &SessionKey) -> Result<ContextWindow> {
        let turns = self.store.load(key).await?;
        Ok(ContextWindow::with_turns(
            self.config.session.context_budget,
            turns,
        ))
    }

    /// Run `task` and persist what it produced. The slot is released when
    /// the caller drops `task`, after the store is up to date.
    ///
    /// Store failures do not discard the outcome; they are reported in
    /// [`Outcome::store_error`].
    async fn generate<K: Sink>(
        &self,
        task: &mut GenerationTask,
        mut window: ContextWindow,
        content: &UserContent,
        sink: &K,
    ) -> Outcome {
        let mut outcome = task
            .run(&self.backend, &mut window, content, sink, &self.config.stream)
            .await;

        // usage is attributed whether or not the dialog can be saved
        if let Err(e) = self
            .store
            .record_usage(task.key(), self.backend.model(), outcome.usage)
            .await
        {
            store_failed(&mut outcome, task.key(), e.context("failed to record usage"));
        }
        if outcome.status == TaskStatus::Completed {
            if let Err(e) = self.store.save(task.key(), window.snapshot()).await {
                store_failed(&mut outcome, task.key(), e.context("failed to save dialog"));
            }
        }
        outcome
    }
}

fn store_failed(outcome: &mut Outcome, key: &SessionKey, e: anyhow::Error) {
    tracing::warn!(session = %key, task = %outcome.task, "{e:#}");
    outcome.store_error.get_or_insert_with(|| format!("{e:#}"));
}
