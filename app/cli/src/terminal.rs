//! Terminal output for streamed answers.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use runtime::{Submission, TaskStatus};
use std::io::{Stdout, Write};
use tcore::{Delivery, DisplayUpdate, Sink};

struct Screen<W> {
    out: W,
    shown: usize,
}

/// A sink that appends each update's new characters to a writer.
///
/// Display updates carry the whole answer so far, so only the part past
/// what is already on screen gets written.
pub struct TerminalSink<W = Stdout> {
    screen: Mutex<Screen<W>>,
}

impl TerminalSink {
    /// A sink writing to standard output.
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> TerminalSink<W> {
    /// A sink writing to `out`.
    pub fn new(out: W) -> Self {
        Self {
            screen: Mutex::new(Screen { out, shown: 0 }),
        }
    }

    /// Give back the writer.
    pub fn into_inner(self) -> W {
        self.screen.into_inner().out
    }

    fn write(&self, update: &DisplayUpdate) -> Result<Delivery> {
        let mut screen = self.screen.lock();
        let fresh: String = update.content.chars().skip(screen.shown).collect();
        screen.shown += fresh.chars().count();

        write!(screen.out, "{fresh}").context("failed to write answer")?;
        if update.is_final {
            writeln!(screen.out).context("failed to write answer")?;
        }
        screen.out.flush().context("failed to flush answer")?;

        Ok(if fresh.is_empty() {
            Delivery::Unchanged
        } else {
            Delivery::Applied
        })
    }
}

impl<W: Write + Send> Sink for TerminalSink<W> {
    async fn deliver(&self, update: DisplayUpdate) -> Result<Delivery> {
        self.write(&update)
    }
}

/// Print what became of a submission, after its answer.
pub fn report(submission: &Submission) {
    match submission {
        Submission::Empty => {}
        Submission::Busy => {
            eprintln!("[still answering the previous message, /cancel to stop it]")
        }
        Submission::EmptyWindow => eprintln!("[no message to retry]"),
        Submission::Finished(outcome) => {
            if outcome.fresh_dialog {
                eprintln!("[the previous dialog timed out, this answer starts a new one]");
            }
            match outcome.status {
                TaskStatus::Completed if outcome.evicted > 0 => {
                    eprintln!("[oldest {} turn(s) dropped from context]", outcome.evicted)
                }
                TaskStatus::Cancelled => eprintln!("\n[cancelled]"),
                TaskStatus::Failed => eprintln!(
                    "\n[failed: {}]",
                    outcome.failure.as_deref().unwrap_or("unknown error")
                ),
                _ => {}
            }
            if let Some(reason) = &outcome.store_error {
                eprintln!("[answer not saved: {reason}]");
            }
        }
    }
}
