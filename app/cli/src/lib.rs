//! Turnstile CLI: a terminal chat over the session runtime, answered by a
//! local echo backend so the admission, cancel and retry flows can be
//! tried without a model.

pub use {
    cmd::{Cli, Command},
    echo::EchoBackend,
    terminal::TerminalSink,
};

pub mod cmd;
pub mod echo;
pub mod repl;
pub mod terminal;
