//! The transport side of a generation.

use crate::stream::DisplayUpdate;
use std::future::Future;

/// What the transport did with a display update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The displayed message was changed.
    Applied,
    /// The content was already on screen; nothing changed.
    Unchanged,
}

/// Receives display updates, typically by editing a placeholder message.
///
/// Implementations report an edit that changed nothing as
/// [`Delivery::Unchanged`] rather than as an error.
pub trait Sink: Send + Sync {
    /// Deliver one display update.
    fn deliver(&self, update: DisplayUpdate) -> impl Future<Output = anyhow::Result<Delivery>> + Send;
}

impl<S: Sink> Sink for &S {
    fn deliver(&self, update: DisplayUpdate) -> impl Future<Output = anyhow::Result<Delivery>> + Send {
        (**self).deliver(update)
    }
}
