//! Core types and collaborator traits for Turnstile.
//!
//! Turnstile keeps at most one answer generation in flight per chat
//! session. This crate holds the pieces that carry no concurrency of
//! their own: the dialog model and its bounded [`ContextWindow`], the
//! [`StreamCoalescer`] that turns growing partial output into display
//! updates, the configuration, and the narrow traits through which the
//! runtime talks to the model [`Backend`], the transport [`Sink`] and the
//! persistence [`DialogStore`].

pub use {
    backend::{Backend, Partial, Usage},
    config::{Config, SessionConfig, StreamConfig},
    dialog::{ContentPart, DialogTurn, UserContent},
    key::SessionKey,
    sink::{Delivery, Sink},
    store::{DialogStore, InMemoryStore},
    stream::{DisplayUpdate, Emit, StreamCoalescer},
    window::{ContextWindow, EmptyWindow},
};

mod backend;
pub mod config;
mod dialog;
mod key;
mod sink;
mod store;
mod stream;
mod window;

#[cfg(feature = "testing")]
pub mod testing;
