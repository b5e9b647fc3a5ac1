//! The model backend seen from the session runtime.

use crate::dialog::{DialogTurn, UserContent};
use futures_core::Stream;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// Token counts reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl Usage {
    /// Usage of `input` prompt and `output` completion tokens.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

impl AddAssign for Usage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// One item of a generation stream.
///
/// Both the text and the usage are cumulative: each partial carries the
/// whole answer produced so far and the token totals so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partial {
    /// The answer so far.
    pub text: String,
    /// Token totals so far.
    pub usage: Usage,
}

impl Partial {
    /// A partial answer with its cumulative usage.
    pub fn new(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            usage,
        }
    }
}

/// A streaming text generator.
///
/// The stream is finite and not restartable; it may yield an error at
/// any point, which ends the generation.
pub trait Backend: Send + Sync {
    /// The model name usage is attributed to.
    fn model(&self) -> &str;

    /// Generate an answer to `message` given the dialog `history`.
    ///
    /// Image parts of `message` are passed through as attachments.
    fn generate(
        &self,
        history: &[DialogTurn],
        message: &UserContent,
    ) -> impl Stream<Item = anyhow::Result<Partial>> + Send;
}
