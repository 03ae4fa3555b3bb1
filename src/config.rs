//! Configuration file parser for ~/.config/rssfeed/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted by serde but logged as warnings, since they are
//! usually typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{FetchOptions, TextColor, TextStyle};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Per-request HTTP timeout in seconds.
    pub request_timeout_secs: u64,

    /// Largest accepted feed document in bytes.
    pub max_feed_bytes: usize,

    /// Retries on 429, 5xx, and truncated downloads.
    pub max_retries: u32,

    /// Feeds fetched in parallel by `refresh`.
    pub concurrency: usize,

    /// SQLite file. Defaults to `feeds.db` next to the config file.
    pub database_path: Option<PathBuf>,

    /// Style given to cleaned entry bodies.
    pub body_style: BodyStyleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            max_feed_bytes: 10 * 1024 * 1024,
            max_retries: 3,
            concurrency: 10,
            database_path: None,
            body_style: BodyStyleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BodyStyleConfig {
    pub font_size: f32,
    pub color: String,
}

impl Default for BodyStyleConfig {
    fn default() -> Self {
        let style = TextStyle::default();
        Self {
            font_size: style.font_size,
            color: style.color.0,
        }
    }
}

impl From<&BodyStyleConfig> for TextStyle {
    fn from(config: &BodyStyleConfig) -> Self {
        TextStyle {
            font_size: config.font_size,
            color: TextColor(config.color.clone()),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 6] = [
        "request_timeout_secs",
        "max_feed_bytes",
        "max_retries",
        "concurrency",
        "database_path",
        "body_style",
    ];

    /// `~/.config/rssfeed`, or `None` when `HOME` is unset.
    pub fn default_dir() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(PathBuf::from(home).join(".config").join("rssfeed"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check the size before reading anything into memory
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(content)?;
        tracing::debug!(
            timeout_secs = config.request_timeout_secs,
            concurrency = config.concurrency,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Database location, falling back to `feeds.db` inside `config_dir`.
    pub fn database_path(&self, config_dir: &Path) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| config_dir.join("feeds.db"))
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            timeout: Duration::from_secs(self.request_timeout_secs),
            max_bytes: self.max_feed_bytes,
            max_retries: self.max_retries,
            concurrency: self.concurrency,
            ..FetchOptions::default()
        }
    }

    pub fn body_style(&self) -> TextStyle {
        TextStyle::from(&self.body_style)
    }
}

// ============================================================================
// Tests
// ============================================================================
