//! Bounded dialog history with FIFO eviction.

use crate::dialog::DialogTurn;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};

/// Returned when a retry asks for a previous turn and there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no message to retry")]
pub struct EmptyWindow;

/// The dialog turns fed back to the model, oldest first.
///
/// Holds at most `budget` turns. Appending past the budget evicts from
/// the front; turns are never reordered and eviction never looks at
/// content, only position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextWindow {
    turns: VecDeque<DialogTurn>,
    budget: usize,
}

impl ContextWindow {
    /// An empty window keeping at most `budget` turns.
    pub fn new(budget: usize) -> Self {
        Self {
            turns: VecDeque::new(),
            budget,
        }
    }

    /// A window restored from a stored snapshot.
    ///
    /// If the snapshot is larger than `budget` (for example after the
    /// budget was lowered) the oldest turns are dropped.
    pub fn with_turns(budget: usize, turns: impl IntoIterator<Item = DialogTurn>) -> Self {
        let mut window = Self {
            turns: turns.into_iter().collect(),
            budget,
        };
        window.evict();
        window
    }

    /// Append a turn and return how many old turns were evicted.
    pub fn append(&mut self, turn: DialogTurn) -> usize {
        self.turns.push_back(turn);
        self.evict()
    }

    /// A copy of the turns, oldest first.
    pub fn snapshot(&self) -> Vec<DialogTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Remove and return the most recent turn.
    pub fn drop_last(&mut self) -> Result<DialogTurn, EmptyWindow> {
        self.turns.pop_back().ok_or(EmptyWindow)
    }

    /// Swap the most recent turn for `turn`, returning the old one.
    pub fn replace_last(&mut self, turn: DialogTurn) -> Result<DialogTurn, EmptyWindow> {
        let last = self.turns.back_mut().ok_or(EmptyWindow)?;
        Ok(std::mem::replace(last, turn))
    }

    /// Drop every turn.
    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Timestamp of the most recent turn.
    pub fn last_turn_at(&self) -> Option<DateTime<Utc>> {
        self.turns.back().map(|turn| turn.timestamp)
    }

    /// Time elapsed between the most recent turn and `now`.
    ///
    /// A turn stamped in the future counts as zero idle time.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.last_turn_at()
            .map(|at| (now - at).to_std().unwrap_or_default())
    }

    /// Whether the window holds turns and has been idle longer than `timeout`.
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        self.idle_for(now).is_some_and(|idle| idle > timeout)
    }

    /// The maximum number of turns kept.
    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Number of turns held.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the window holds no turns.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Iterate over the turns, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &DialogTurn> {
        self.turns.iter()
    }

    fn evict(&mut self) -> usize {
        let mut evicted = 0;
        while self.turns.len() > self.budget {
            self.turns.pop_front();
            evicted += 1;
        }
        evicted
    }
}
