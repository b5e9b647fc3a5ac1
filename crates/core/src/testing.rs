//! Scripted collaborators for tests.
//!
//! [`ScriptedBackend`] replays a fixed list of steps instead of calling a
//! model, and [`RecordingSink`] keeps every display update it receives.
//! Both can be paused on a [`Notify`] so tests can interleave
//! cancellation and admission with a running generation.

use crate::{
    backend::{Backend, Partial, Usage},
    dialog::{DialogTurn, UserContent},
    sink::{Delivery, Sink},
    stream::DisplayUpdate,
};
use futures_core::Stream;
use parking_lot::Mutex;
use std::{future::Future, sync::Arc};
use tokio::sync::Notify;

/// One step of a scripted generation.
#[derive(Debug, Clone)]
pub enum Step {
    /// Yield a partial answer.
    Partial(Partial),
    /// Block until the notify fires.
    Pause(Arc<Notify>),
    /// Yield an error and stop.
    Fail(String),
}

impl Step {
    /// A partial of `text` with cumulative usage `input`/`output`.
    pub fn partial(text: impl Into<String>, input: u64, output: u64) -> Self {
        Self::Partial(Partial::new(text, Usage::new(input, output)))
    }
}

/// A backend replaying the same steps on every call.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    steps: Arc<Vec<Step>>,
    calls: Arc<Mutex<Vec<(Vec<DialogTurn>, UserContent)>>>,
}

impl ScriptedBackend {
    /// Replay `steps` on every generation.
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: Arc::new(steps.into_iter().collect()),
            calls: Arc::default(),
        }
    }

    /// Stream `text` as growing partials of `chunk` characters, counting
    /// one output token per chunk.
    pub fn chunked(text: &str, chunk: usize, input_tokens: u64) -> Self {
        let chars: Vec<char> = text.chars().collect();
        let steps = chars
            .chunks(chunk.max(1))
            .enumerate()
            .scan(String::new(), |acc, (i, piece)| {
                acc.extend(piece);
                Some(Step::partial(acc.clone(), input_tokens, i as u64 + 1))
            })
            .collect::<Vec<_>>();
        Self::new(steps)
    }

    /// Every `(history, message)` pair this backend was called with.
    pub fn calls(&self) -> Vec<(Vec<DialogTurn>, UserContent)> {
        self.calls.lock().clone()
    }
}

impl Backend for ScriptedBackend {
    fn model(&self) -> &str {
        "scripted"
    }

    fn generate(
        &self,
        history: &[DialogTurn],
        message: &UserContent,
    ) -> impl Stream<Item = anyhow::Result<Partial>> + Send {
        self.calls.lock().push((history.to_vec(), message.clone()));
        let steps = self.steps.clone();
        async_stream::try_stream! {
            for step in steps.iter() {
                match step {
                    Step::Partial(partial) => yield partial.clone(),
                    Step::Pause(notify) => notify.notified().await,
                    Step::Fail(reason) => Err(anyhow::anyhow!("{reason}"))?,
                }
            }
        }
    }
}

#[derive(Default)]
struct Recording {
    updates: Mutex<Vec<DisplayUpdate>>,
    delivered: Notify,
    gate: Option<Notify>,
}

/// A sink recording every update.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Recording>,
}

impl RecordingSink {
    /// A sink that accepts updates immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that waits for [`open`](Self::open) after every update.
    pub fn gated() -> Self {
        Self {
            inner: Arc::new(Recording {
                gate: Some(Notify::new()),
                ..Recording::default()
            }),
        }
    }

    /// Let one waiting delivery return.
    pub fn open(&self) {
        if let Some(gate) = &self.inner.gate {
            gate.notify_one();
        }
    }

    /// Wait until an update has been recorded.
    pub fn delivered(&self) -> impl Future<Output = ()> + '_ {
        self.inner.delivered.notified()
    }

    /// Every update received so far.
    pub fn updates(&self) -> Vec<DisplayUpdate> {
        self.inner.updates.lock().clone()
    }
}

impl Sink for RecordingSink {
    async fn deliver(&self, update: DisplayUpdate) -> anyhow::Result<Delivery> {
        let unchanged = {
            let mut updates = self.inner.updates.lock();
            let unchanged = updates.last().is_some_and(|last| last.content == update.content);
            updates.push(update);
            unchanged
        };
        self.inner.delivered.notify_one();
        if let Some(gate) = &self.inner.gate {
            gate.notified().await;
        }
        Ok(if unchanged {
            Delivery::Unchanged
        } else {
            Delivery::Applied
        })
    }
}

/// A sink whose every delivery fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokenSink;

impl Sink for BrokenSink {
    async fn deliver(&self, _update: DisplayUpdate) -> anyhow::Result<Delivery> {
        anyhow::bail!("chat not found")
    }
}
