//! Persistence of dialog windows and token usage.
//!
//! The runtime never performs I/O itself. It loads a window snapshot
//! before a generation, saves it after the turn is appended, and
//! records usage for every finished generation, all through a
//! caller-supplied [`DialogStore`].

use crate::{backend::Usage, dialog::DialogTurn, key::SessionKey};
use compact_str::CompactString;
use parking_lot::Mutex;
use std::{collections::BTreeMap, future::Future};

/// Load/save pair for dialog windows plus a usage ledger.
pub trait DialogStore: Send + Sync {
    /// Load the current dialog of `key`, oldest turn first.
    fn load(&self, key: &SessionKey) -> impl Future<Output = anyhow::Result<Vec<DialogTurn>>> + Send;

    /// Replace the current dialog of `key`.
    fn save(
        &self,
        key: &SessionKey,
        turns: Vec<DialogTurn>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;

    /// Add `usage` to the totals of `key` for `model`.
    fn record_usage(
        &self,
        key: &SessionKey,
        model: &str,
        usage: Usage,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Process-local store, keeping everything in maps.
#[derive(Default, Debug)]
pub struct InMemoryStore {
    dialogs: Mutex<BTreeMap<SessionKey, Vec<DialogTurn>>>,
    usage: Mutex<BTreeMap<(SessionKey, CompactString), Usage>>,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current dialog of `key`.
    pub fn dialog(&self, key: &SessionKey) -> Vec<DialogTurn> {
        self.dialogs.lock().get(key).cloned().unwrap_or_default()
    }

    /// Accumulated usage of `key` on `model`.
    pub fn usage(&self, key: &SessionKey, model: &str) -> Usage {
        self.usage
            .lock()
            .get(&(key.clone(), CompactString::from(model)))
            .copied()
            .unwrap_or_default()
    }

    /// Accumulated usage of `key` across all models.
    pub fn total_usage(&self, key: &SessionKey) -> Usage {
        let mut total = Usage::default();
        for ((k, _), usage) in self.usage.lock().iter() {
            if k == key {
                total += *usage;
            }
        }
        total
    }
}

impl DialogStore for InMemoryStore {
    fn load(&self, key: &SessionKey) -> impl Future<Output = anyhow::Result<Vec<DialogTurn>>> + Send {
        let turns = self.dialog(key);
        std::future::ready(Ok(turns))
    }

    fn save(
        &self,
        key: &SessionKey,
        turns: Vec<DialogTurn>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        self.dialogs.lock().insert(key.clone(), turns);
        std::future::ready(Ok(()))
    }

    fn record_usage(
        &self,
        key: &SessionKey,
        model: &str,
        usage: Usage,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        *self
            .usage
            .lock()
            .entry((key.clone(), CompactString::from(model)))
            .or_default() += usage;
        std::future::ready(Ok(()))
    }
}

impl<S: DialogStore> DialogStore for std::sync::Arc<S> {
    fn load(&self, key: &SessionKey) -> impl Future<Output = anyhow::Result<Vec<DialogTurn>>> + Send {
        (**self).load(key)
    }

    fn save(
        &self,
        key: &SessionKey,
        turns: Vec<DialogTurn>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).save(key, turns)
    }

    fn record_usage(
        &self,
        key: &SessionKey,
        model: &str,
        usage: Usage,
    ) -> impl Future<Output = anyhow::Result<()>> + Send {
        (**self).record_usage(key, model, usage)
    }
}
