//! Session identity.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one conversational session.
///
/// A private chat gets one session per user, a group chat one session
/// for the whole group.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SessionKey {
    /// Per-peer direct message session.
    Dm(CompactString),
    /// Per-group session.
    Group(CompactString),
}

impl SessionKey {
    /// Session of a private chat with `user`.
    pub fn dm(user: impl Into<CompactString>) -> Self {
        Self::Dm(user.into())
    }

    /// Session shared by every member of `group`.
    pub fn group(group: impl Into<CompactString>) -> Self {
        Self::Group(group.into())
    }

    /// The platform identifier without the scope.
    pub fn id(&self) -> &str {
        match self {
            Self::Dm(id) | Self::Group(id) => id,
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Dm(id) => write!(f, "dm:{id}"),
            Self::Group(id) => write!(f, "group:{id}"),
        }
    }
}
