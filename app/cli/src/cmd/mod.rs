//! CLI argument parsing and command dispatch.

use crate::{echo::EchoBackend, repl::ChatRepl};
use anyhow::Result;
use clap::{Parser, Subcommand};
use compact_str::CompactString;
use runtime::Runtime;
use std::{path::PathBuf, sync::Arc};
use tcore::{Config, InMemoryStore, SessionKey, config::global_config_path};

pub mod send;

/// Single-flight chat sessions in the terminal.
#[derive(Parser, Debug)]
#[command(name = "turnstile", about = "Single-flight chat sessions in the terminal")]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Config file; defaults to the global turnstile.toml.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Session the dialog is kept under.
    #[arg(long, global = true, default_value = "local")]
    pub session: CompactString,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start an interactive chat.
    Chat,
    /// Send a one-shot message.
    Send {
        /// Message content.
        content: String,
    },
}

impl Cli {
    /// Run the selected command.
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let runtime = Runtime::new(config, EchoBackend::default(), InMemoryStore::new());
        let key = SessionKey::dm(self.session);

        match self.command {
            Command::Chat => ChatRepl::new(Arc::new(runtime), key).run().await,
            Command::Send { content } => send::run(&runtime, &key, content).await,
        }
    }

    fn load_config(&self) -> Result<Config> {
        if let Some(path) = &self.config {
            return Config::load(path);
        }
        match global_config_path() {
            Some(path) => Config::load_or_default(&path),
            None => Ok(Config::default()),
        }
    }
}
