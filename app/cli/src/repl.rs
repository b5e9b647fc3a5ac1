//! Interactive chat over standard input.
//!
//! Lines are read while an answer streams, so `/cancel` can reach the
//! running generation. Any other line is submitted right away; if the
//! session is still busy the runtime turns it down.

use crate::terminal::{TerminalSink, report};
use anyhow::{Context, Result};
use runtime::{CancelOutcome, NewDialog, Runtime};
use std::sync::Arc;
use tcore::{Backend, InMemoryStore, SessionKey, UserContent};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinSet,
};

/// A chat command typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// A message for the model.
    Message(String),
    /// Stop the running answer.
    Cancel,
    /// Answer the last message again.
    Retry,
    /// Forget the dialog.
    NewDialog,
    /// Blank line.
    Nothing,
}

impl Input {
    /// Classify one line of input.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "" => Self::Nothing,
            "/cancel" => Self::Cancel,
            "/retry" => Self::Retry,
            "/new" => Self::NewDialog,
            text => Self::Message(text.to_owned()),
        }
    }
}

/// Interactive chat REPL, generic over the model backend.
pub struct ChatRepl<B: Backend + 'static> {
    runtime: Arc<Runtime<B, InMemoryStore>>,
    key: SessionKey,
    generations: JoinSet<()>,
}

impl<B: Backend + 'static> ChatRepl<B> {
    /// Create a REPL chatting in `key`'s session.
    pub fn new(runtime: Arc<Runtime<B, InMemoryStore>>, key: SessionKey) -> Self {
        Self {
            runtime,
            key,
            generations: JoinSet::new(),
        }
    }

    /// Run until standard input is closed.
    pub async fn run(&mut self) -> Result<()> {
        println!("Turnstile chat (Ctrl+D to exit, /cancel /retry /new)");
        println!("---");

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await.context("failed to read input")? {
            // reap finished generations
            while self.generations.try_join_next().is_some() {}

            match Input::parse(&line) {
                Input::Nothing => {}
                Input::Cancel => match self.runtime.cancel(&self.key) {
                    CancelOutcome::Cancelled => {}
                    CancelOutcome::NothingToCancel => eprintln!("[nothing to cancel]"),
                },
                Input::NewDialog => match self.runtime.new_dialog(&self.key).await? {
                    NewDialog::Started => eprintln!("[new dialog started]"),
                    NewDialog::Busy => {
                        eprintln!("[still answering, /cancel first to start a new dialog]")
                    }
                },
                Input::Retry => self.spawn(None),
                Input::Message(text) => self.spawn(Some(UserContent::text(text))),
            }
        }

        self.runtime.cancel(&self.key);
        while self.generations.join_next().await.is_some() {}
        Ok(())
    }

    /// Start a generation without blocking the prompt.
    fn spawn(&mut self, message: Option<UserContent>) {
        let runtime = self.runtime.clone();
        let key = self.key.clone();
        self.generations.spawn(async move {
            let sink = TerminalSink::stdout();
            let submission = match message {
                Some(content) => runtime.submit(&key, content, &sink).await,
                None => runtime.retry(&key, &sink).await,
            };
            match submission {
                Ok(submission) => report(&submission),
                Err(e) => {
                    tracing::warn!(session = %key, "generation failed: {e:#}");
                    eprintln!("\n[error: {e:#}]");
                }
            }
        });
    }
}
