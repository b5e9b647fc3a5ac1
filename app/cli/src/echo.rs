//! A local backend that streams the message back word by word.

use futures_core::Stream;
use std::time::Duration;
use tcore::{Backend, DialogTurn, Partial, Usage, UserContent};

/// Echoes the user's message, one word per tick.
///
/// Token counts are word counts: the prompt is the whole history plus
/// the message, the completion is the words streamed so far.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    tick: Duration,
}

impl Default for EchoBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(80))
    }
}

impl EchoBackend {
    /// An echo backend pausing `tick` before each word.
    pub fn new(tick: Duration) -> Self {
        Self { tick }
    }
}

impl Backend for EchoBackend {
    fn model(&self) -> &str {
        "echo"
    }

    fn generate(
        &self,
        history: &[DialogTurn],
        message: &UserContent,
    ) -> impl Stream<Item = anyhow::Result<Partial>> + Send {
        let prompt = history
            .iter()
            .map(|turn| words(&turn.user.joined_text()) + words(&turn.bot))
            .sum::<usize>()
            + words(&message.joined_text());
        let reply = reply_to(message, history.len());
        let tick = self.tick;

        async_stream::stream! {
            let mut text = String::new();
            for (n, word) in reply.split_inclusive(' ').enumerate() {
                tokio::time::sleep(tick).await;
                text.push_str(word);
                let usage = Usage::new(prompt as u64, n as u64 + 1);
                yield Ok::<_, anyhow::Error>(Partial::new(text.clone(), usage));
            }
        }
    }
}

fn words(text: &str) -> usize {
    text.split_whitespace().count()
}

fn reply_to(message: &UserContent, earlier_turns: usize) -> String {
    let mut reply = format!("(turn {}) you said: {}", earlier_turns + 1, message.joined_text());
    if message.has_image() {
        reply.push_str(" [with an image]");
    }
    reply
}
