//! Configuration storage

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::imessage;
use crate::pipeline::estimate::DEFAULT_COST_PER_1K_CHARS;
use crate::pipeline::{merge, LinkSettings, RunSettings, SpeechTables};

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Messages database; defaults to ~/Library/Messages/chat.db
    pub db_path: Option<PathBuf>,
    /// Maximum gap between same-sender messages that still merge
    pub merge_window_secs: u64,
    /// Replace URLs with page titles (needs network)
    pub resolve_links: bool,
    pub link_timeout_secs: u64,
    pub link_max_body_bytes: usize,
    pub link_concurrency: usize,
    /// USD per 1000 characters, for `estimate`
    pub cost_per_1k_chars: f64,
    /// Speech normalization tables
    pub speech: SpeechTables,
}

impl Default for Config {
    fn default() -> Self {
        let links = LinkSettings::default();
        Self {
            db_path: None,
            merge_window_secs: merge::DEFAULT_WINDOW_SECS,
            resolve_links: true,
            link_timeout_secs: links.timeout.as_secs(),
            link_max_body_bytes: links.max_body_bytes,
            link_concurrency: links.concurrency,
            cost_per_1k_chars: DEFAULT_COST_PER_1K_CHARS,
            speech: SpeechTables::default(),
        }
    }
}

impl Config {
    /// Get config directory path
    fn config_dir() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "chatcast", "chatcast")
            .context("Could not determine config directory")?;
        Ok(proj_dirs.config_dir().to_path_buf())
    }

    /// Get config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from an explicit file. A missing file means defaults.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<PathBuf> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir).context("Failed to create config directory")?;

        let path = Self::config_path()?;
        fs::write(&path, self.to_toml()?).context("Failed to write config file")?;
        Ok(path)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Database to open: command line, then config file, then the
    /// platform default.
    pub fn effective_db_path(&self, cli: Option<&Path>) -> Option<PathBuf> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.db_path.clone())
            .or_else(imessage::default_db_path)
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            merge_window_secs: self.merge_window_secs,
            resolve_links: self.resolve_links,
            links: LinkSettings {
                timeout: Duration::from_secs(self.link_timeout_secs),
                max_body_bytes: self.link_max_body_bytes,
                concurrency: self.link_concurrency,
            },
            speech: self.speech.clone(),
            ..RunSettings::default()
        }
    }
}
