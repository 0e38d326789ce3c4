//! Configuration module for flyfeed.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

use crate::feed::types::{slugify, SourceType};
use crate::{FlyfeedError, Result};

/// Aggregator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AggregatorConfig {
    /// Seconds between background refresh cycles.
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Upper bound for one whole refresh cycle in seconds.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
    /// Persisted items older than this many days are deleted (<= 0 disables the sweep).
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// TTL of the cached snapshot in hours.
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,
    /// Minimum interval between two requests to the same host, in milliseconds.
    #[serde(default = "default_rate_limit_interval")]
    pub rate_limit_interval_ms: u64,
    /// Keep the previous snapshot when every source failed in a cycle.
    #[serde(default = "default_keep_snapshot")]
    pub keep_snapshot_on_total_failure: bool,
}

fn default_refresh_interval() -> u64 {
    900 // 15 minutes
}

fn default_refresh_timeout() -> u64 {
    120
}

fn default_retention_days() -> i64 {
    90
}

fn default_cache_ttl_hours() -> u64 {
    48
}

fn default_rate_limit_interval() -> u64 {
    1000
}

fn default_keep_snapshot() -> bool {
    true
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval(),
            refresh_timeout_secs: default_refresh_timeout(),
            retention_days: default_retention_days(),
            cache_ttl_hours: default_cache_ttl_hours(),
            rate_limit_interval_ms: default_rate_limit_interval(),
            keep_snapshot_on_total_failure: default_keep_snapshot(),
        }
    }
}

/// Default settings shared by every fetcher.
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Per-fetch timeout in seconds.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,
    /// Maximum items returned by one fetch.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Maximum response body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

fn default_fetch_timeout() -> u64 {
    30
}

fn default_max_items() -> usize {
    50
}

fn default_user_agent() -> String {
    "flyfeed/0.1 (+https://github.com/flyfeed/flyfeed)".to_string()
}

fn default_max_body_bytes() -> u64 {
    5 * 1024 * 1024 // 5MB
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            max_items: default_max_items(),
            user_agent: default_user_agent(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Whether the persistent item store is used.
    #[serde(default = "default_db_enabled")]
    pub enabled: bool,
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_enabled() -> bool {
    true
}

fn default_db_path() -> String {
    "data/flyfeed.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: default_db_enabled(),
            path: default_db_path(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/flyfeed.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// A keyword rule for the tagger.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TagRule {
    /// Word or phrase to look for (case-insensitive).
    pub keyword: String,
    /// Tag emitted when the keyword is found.
    pub tag: String,
}

/// Tagger configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaggerConfig {
    /// Rules appended to the built-in rule set.
    #[serde(default)]
    pub rules: Vec<TagRule>,
}

/// CSS selectors used to scrape a forum listing page.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ForumSelectors {
    /// Selector matching one element per thread.
    pub container: String,
    /// Title selector, relative to the container.
    pub title: String,
    /// Link selector, relative to the container (defaults to the title element).
    #[serde(default)]
    pub link: Option<String>,
    /// Author selector.
    #[serde(default)]
    pub author: Option<String>,
    /// Date selector (`datetime` attribute or text).
    #[serde(default)]
    pub date: Option<String>,
    /// Summary selector.
    #[serde(default)]
    pub summary: Option<String>,
    /// Selector of the "next page" link, used when `max_pages` > 1.
    #[serde(default)]
    pub next_page: Option<String>,
}

/// A configured upstream source.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Explicit slug; derived from the name when omitted.
    #[serde(default)]
    pub id: Option<String>,
    /// Display name.
    pub name: String,
    /// Protocol family.
    pub kind: SourceType,
    /// Feed / listing URL.
    pub url: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the source is fetched.
    #[serde(default = "default_source_enabled")]
    pub enabled: bool,
    /// Overrides `fetch.max_items`.
    #[serde(default)]
    pub max_items: Option<usize>,
    /// Overrides `fetch.timeout_secs`.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Number of listing pages scraped for forum sources.
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    /// Forum scraping selectors.
    #[serde(default)]
    pub selectors: Option<ForumSelectors>,
}

fn default_source_enabled() -> bool {
    true
}

fn default_max_pages() -> usize {
    1
}

impl SourceConfig {
    /// Create a source config with defaults for the optional fields.
    pub fn new(name: impl Into<String>, kind: SourceType, url: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            kind,
            url: url.into(),
            description: String::new(),
            enabled: true,
            max_items: None,
            timeout_secs: None,
            max_pages: default_max_pages(),
            selectors: None,
        }
    }

    /// The id this source is known by.
    pub fn source_id(&self) -> String {
        match &self.id {
            Some(id) if !id.trim().is_empty() => id.trim().to_string(),
            _ => slugify(&self.name),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Aggregator configuration.
    #[serde(default)]
    pub aggregator: AggregatorConfig,
    /// Fetcher defaults.
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Tagger configuration.
    #[serde(default)]
    pub tagger: TaggerConfig,
    /// Configured sources.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(FlyfeedError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| FlyfeedError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `FLYFEED_DATABASE_PATH`: Override the database path
    /// - `FLYFEED_RETENTION_DAYS`: Override the retention threshold
    /// - `FLYFEED_LOG_LEVEL`: Override the log level
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FLYFEED_DATABASE_PATH") {
            if !path.is_empty() {
                self.database.path = path;
            }
        }
        if let Ok(days) = std::env::var("FLYFEED_RETENTION_DAYS") {
            if let Ok(days) = days.trim().parse() {
                self.aggregator.retention_days = days;
            }
        }
        if let Ok(level) = std::env::var("FLYFEED_LOG_LEVEL") {
            if !level.is_empty() {
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if:
    /// - A source has an empty name
    /// - Two sources share an id
    /// - A source URL is not http(s)
    /// - A forum source has no selectors
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(FlyfeedError::Validation(
                    "source name must not be empty".to_string(),
                ));
            }

            let id = source.source_id();
            if !seen.insert(id.clone()) {
                return Err(FlyfeedError::Validation(format!(
                    "duplicate source id: {id}"
                )));
            }

            let parsed = url::Url::parse(&source.url).map_err(|e| {
                FlyfeedError::Validation(format!("invalid URL for source {}: {e}", source.name))
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(FlyfeedError::Validation(format!(
                    "unsupported URL scheme for source {}: {}",
                    source.name,
                    parsed.scheme()
                )));
            }

            if source.kind == SourceType::Forum && source.selectors.is_none() {
                return Err(FlyfeedError::Validation(format!(
                    "forum source {} has no selectors",
                    source.name
                )));
            }
        }
        Ok(())
    }
}
