//! Configuration file parser for ~/.config/feedloader/config.toml.
//!
//! The config file is optional. A missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning for each one
//! since they are usually typos.
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::feed::{max_age_filter, HttpTransport, LoadOptions, DEFAULT_TIMEOUT};

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

    /// The HTTP client could not be built from the configured settings.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level loader configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sources loaded when none are given on the command line.
    pub sources: Vec<String>,

    /// Wall-clock budget for one load, in seconds.
    pub timeout_secs: u64,

    /// Maximum items per source and overall (0 = unlimited).
    pub max_items: usize,

    /// Sort items newest first.
    pub sort: bool,

    /// Drop items older than this many days (0 = keep everything).
    pub max_age_days: u32,

    /// Upper bound for a single HTTP request, in seconds.
    pub request_timeout_secs: u64,

    /// Largest feed body accepted, in bytes.
    pub max_feed_bytes: usize,

    /// Custom `User-Agent` header for feed requests.
    pub user_agent: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT.as_secs(),
            max_items: 0,
            sort: true,
            max_age_days: 0,
            request_timeout_secs: HttpTransport::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            max_feed_bytes: HttpTransport::DEFAULT_MAX_BODY_BYTES,
            user_agent: None,
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 8] = [
        "sources",
        "timeout_secs",
        "max_items",
        "sort",
        "max_age_days",
        "request_timeout_secs",
        "max_feed_bytes",
        "user_agent",
    ];

    /// Default config location, `$HOME/.config/feedloader/config.toml`.
    ///
    /// Returns `None` when `HOME` is unset.
    pub fn default_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME")?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("feedloader")
                .join("config.toml"),
        )
    }

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // Check size before reading so a huge file is never pulled into memory
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
                // File deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(
            path = %path.display(),
            sources = config.sources.len(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Builds [`LoadOptions`] from this config. `now` anchors the age filter.
    pub fn load_options(&self, now: DateTime<Utc>) -> LoadOptions {
        LoadOptions {
            max_items: self.max_items,
            sort: self.sort,
            filter: max_age_filter(self.max_age_days, now),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }

    /// Builds the HTTP transport with this config's limits and user agent.
    pub fn transport(&self) -> Result<HttpTransport, ConfigError> {
        let mut builder = reqwest::Client::builder();
        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.as_str());
        }
        let client = builder.build()?;

        Ok(HttpTransport::new(client)
            .with_request_timeout(Duration::from_secs(self.request_timeout_secs))
            .with_max_body_bytes(self.max_feed_bytes))
    }
}

// ============================================================================
// Tests
// ============================================================================
