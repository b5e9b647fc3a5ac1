//! Coalescing of streamed partial output into display updates.

use crate::config::StreamConfig;

/// A display update handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayUpdate {
    /// The full content to display so far.
    pub content: String,
    /// Whether this is the last update of the generation.
    pub is_final: bool,
}

/// The decision for one offered candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Emit {
    /// Deliver this update.
    Emit(DisplayUpdate),
    /// Not enough growth yet; skip.
    Suppress,
}

/// Decides which partial outputs are worth an edit of the placeholder.
///
/// Content is cut to `max_len` characters before any comparison, so the
/// lengths it reasons about are the lengths the transport will see. A
/// non-final candidate is emitted once it has grown by at least
/// `emit_threshold` characters since the last emitted one; the final
/// candidate is always emitted. A final candidate shorter than what is
/// already shown is emitted as the shown content.
#[derive(Debug, Clone)]
pub struct StreamCoalescer {
    emit_threshold: usize,
    max_len: usize,
    last_emitted: String,
    last_emitted_len: usize,
}

impl StreamCoalescer {
    /// Create a coalescer with the given threshold and length cap.
    pub fn new(emit_threshold: usize, max_len: usize) -> Self {
        Self {
            emit_threshold,
            max_len,
            last_emitted: String::new(),
            last_emitted_len: 0,
        }
    }

    /// Offer the content accumulated so far.
    pub fn offer(&mut self, candidate: &str, is_final: bool) -> Emit {
        let content = truncate(candidate, self.max_len);
        let len = content.chars().count();

        // content already shown is never taken back
        if len < self.last_emitted_len {
            return if is_final {
                Emit::Emit(DisplayUpdate {
                    content: self.last_emitted.clone(),
                    is_final,
                })
            } else {
                Emit::Suppress
            };
        }

        if !is_final && len - self.last_emitted_len < self.emit_threshold {
            return Emit::Suppress;
        }

        self.last_emitted = content.to_owned();
        self.last_emitted_len = len;
        Emit::Emit(DisplayUpdate {
            content: self.last_emitted.clone(),
            is_final,
        })
    }

    /// Length in characters of the last emitted content.
    pub fn last_emitted_len(&self) -> usize {
        self.last_emitted_len
    }
}

impl From<&StreamConfig> for StreamCoalescer {
    fn from(config: &StreamConfig) -> Self {
        Self::new(config.emit_threshold, config.max_message_len)
    }
}

/// Cut `text` to at most `max` characters.
pub(crate) fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
