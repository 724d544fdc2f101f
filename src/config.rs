//! Configuration file parser.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are silently ignored by serde (with `deny_unknown_fields` off),
//! though we log a warning when the file contains potential typos.
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::feed::{DispatchOptions, Mapping, MappingResolver, MAX_FEED_SIZE};
use crate::services::Engine;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    #[error("Invalid {name} URL '{value}': {source}")]
    InvalidUrl {
        name: &'static str,
        value: String,
        #[source]
        source: url::ParseError,
    },
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub fetch: FetchConfig,
    pub index: IndexConfig,
    pub jobs: JobsConfig,
    /// Mapping overrides keyed by feed URL.
    pub mappings: HashMap<String, Mapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path, or `:memory:`.
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: "feeds.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    /// Request timeout in seconds. `None` keeps the transport default.
    pub timeout_secs: Option<u64>,
    pub max_feed_bytes: usize,
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("audiofeed/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout_secs: None,
            max_feed_bytes: MAX_FEED_SIZE,
            max_redirects: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Elasticsearch server URL.
    pub url: String,
    pub index: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "audio".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// Base URL of the job server API.
    pub url: String,
    /// Task created for every record.
    pub task: String,
    pub engine: Engine,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080/api/v1".to_string(),
            task: "transcribe".to_string(),
            engine: Engine::default(),
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] = ["store", "fetch", "index", "jobs", "mappings"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML or an invalid mapping → `Err(ConfigError::Parse)`
    /// - Unknown top-level keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
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
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::from_toml(&content)?;
        tracing::info!(
            path = %path.display(),
            store = %config.store.path,
            mappings = config.mappings.len(),
            "Loaded configuration"
        );
        Ok(config)
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

        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides. Environment values take precedence over
    /// the file. Pass `|name| std::env::var(name).ok()` for the process
    /// environment.
    ///
    /// - `ELASTICSEARCH_URL` → `index.url`
    /// - `ELASTICSEARCH_INDEX` → `index.index`
    /// - `OAS_URL` → `jobs.url`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("ELASTICSEARCH_URL") {
            self.index.url = url;
        }
        if let Some(index) = lookup("ELASTICSEARCH_INDEX") {
            self.index.index = index;
        }
        if let Some(url) = lookup("OAS_URL") {
            self.jobs.url = url;
        }
    }

    /// A resolver seeded with the configured mapping overrides.
    pub fn resolver(&self) -> MappingResolver {
        MappingResolver::with_overrides(self.mappings.clone())
    }

    pub fn dispatch_options(&self) -> DispatchOptions {
        DispatchOptions {
            task: self.jobs.task.clone(),
            engine: self.jobs.engine,
        }
    }

    pub fn index_url(&self) -> Result<Url, ConfigError> {
        parse_url("index", &self.index.url)
    }

    pub fn jobs_url(&self) -> Result<Url, ConfigError> {
        parse_url("jobs", &self.jobs.url)
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        name,
        value: value.to_string(),
        source,
    })
}

// ============================================================================
// Tests
// ============================================================================
