//! Dialog turns and the typed parts of a user message.

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One typed part of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text(String),
    /// Base64-encoded image bytes.
    Image(String),
}

impl ContentPart {
    /// Encode raw image bytes into an image part.
    pub fn image_bytes(bytes: &[u8]) -> Self {
        Self::Image(STANDARD.encode(bytes))
    }

    /// Decode the bytes of an image part.
    ///
    /// Returns `None` for text parts.
    pub fn decode_image(&self) -> Option<anyhow::Result<Vec<u8>>> {
        match self {
            Self::Image(data) => Some(STANDARD.decode(data).map_err(Into::into)),
            Self::Text(_) => None,
        }
    }

    /// The text of a text part.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }
}

/// The user side of a dialog turn: an ordered list of parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserContent {
    parts: Vec<ContentPart>,
}

impl UserContent {
    /// A message made of a single text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// A message made of the given parts, in order.
    pub fn from_parts(parts: impl IntoIterator<Item = ContentPart>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    /// Append an image part.
    pub fn with_image(mut self, bytes: &[u8]) -> Self {
        self.parts.push(ContentPart::image_bytes(bytes));
        self
    }

    /// The parts in order.
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// Whether the message has any image part.
    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|part| matches!(part, ContentPart::Image(_)))
    }

    /// All text parts joined by newlines.
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(ContentPart::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// True when there is neither an image nor any non-blank text.
    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|part| match part {
            ContentPart::Text(text) => text.trim().is_empty(),
            ContentPart::Image(_) => false,
        })
    }
}

impl From<&str> for UserContent {
    fn from(text: &str) -> Self {
        Self::text(text)
    }
}

impl From<String> for UserContent {
    fn from(text: String) -> Self {
        Self::text(text)
    }
}

/// One exchange in a dialog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogTurn {
    /// What the user sent.
    pub user: UserContent,
    /// What the bot answered; empty if the generation did not complete.
    pub bot: String,
    /// When the turn was recorded.
    pub timestamp: DateTime<Utc>,
}

impl DialogTurn {
    /// A turn recorded now.
    pub fn new(user: impl Into<UserContent>, bot: impl Into<String>) -> Self {
        Self::at(user, bot, Utc::now())
    }

    /// A turn recorded at `timestamp`.
    pub fn at(user: impl Into<UserContent>, bot: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            user: user.into(),
            bot: bot.into(),
            timestamp,
        }
    }
}
