//! Runtime configuration loaded from TOML.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// Config directory name under platform config dir.
pub const CONFIG_DIR: &str = "turnstile";
/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "turnstile.toml";

/// Resolve the global configuration file (`~/.config/turnstile/turnstile.toml` on unix).
pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Dialog and session policy.
    #[serde(default)]
    pub session: SessionConfig,
    /// Display update policy.
    #[serde(default)]
    pub stream: StreamConfig,
}

/// Dialog and session policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Maximum number of turns kept in a dialog.
    pub context_budget: usize,
    /// Seconds of silence after which the next message starts a new
    /// dialog. Zero disables the timeout.
    pub new_dialog_timeout: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_budget: 30,
            new_dialog_timeout: 600,
        }
    }
}

impl SessionConfig {
    /// The idle timeout, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.new_dialog_timeout > 0).then(|| Duration::from_secs(self.new_dialog_timeout))
    }
}

/// Display update policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Characters of growth required before a non-final update.
    pub emit_threshold: usize,
    /// Transport message size limit in characters.
    pub max_message_len: usize,
    /// Pause after each delivered update, in milliseconds.
    pub edit_interval_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            emit_threshold: 100,
            max_message_len: 4096,
            edit_interval_ms: 10,
        }
    }
}

impl StreamConfig {
    /// Pause after each delivered update.
    pub fn edit_interval(&self) -> Duration {
        Duration::from_millis(self.edit_interval_ms)
    }
}

impl Config {
    /// Parse a TOML string into a `Config`.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).context("invalid turnstile config")
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }
}
