//! One-shot message command.

use crate::terminal::{TerminalSink, report};
use anyhow::Result;
use runtime::Runtime;
use tcore::{Backend, InMemoryStore, SessionKey, UserContent};

/// Send a message and print the answer as it streams.
pub async fn run<B: Backend>(
    runtime: &Runtime<B, InMemoryStore>,
    key: &SessionKey,
    content: String,
) -> Result<()> {
    let sink = TerminalSink::stdout();
    let submission = runtime.submit(key, UserContent::text(content), &sink).await?;
    report(&submission);
    Ok(())
}
