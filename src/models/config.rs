//! Application configuration structures.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Selector discovery settings
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Result extraction rules
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Live search and result cache settings
    #[serde(default)]
    pub search: SearchConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Serialize the configuration back to TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.discovery.invalid_query.trim().is_empty() {
            return Err(AppError::validation("discovery.invalid_query is empty"));
        }
        if self.discovery.fallback_queries.is_empty() {
            return Err(AppError::validation("No discovery.fallback_queries defined"));
        }
        if self.search.max_parallelism == 0 {
            return Err(AppError::validation("search.max_parallelism must be > 0"));
        }
        if self.search.search_timeout_secs == 0 {
            return Err(AppError::validation(
                "search.search_timeout_secs must be > 0",
            ));
        }
        if self.search.retention_hours == 0 {
            return Err(AppError::validation("search.retention_hours must be > 0"));
        }
        Ok(())
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Maximum sites probed concurrently while building the catalog
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
            max_concurrent: defaults::max_concurrent(),
        }
    }
}

/// Selector discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Nonsense query used to render a guaranteed-empty results page
    #[serde(default = "defaults::invalid_query")]
    pub invalid_query: String,

    /// Queries used when a category has no dedicated list
    #[serde(default = "defaults::fallback_queries")]
    pub fallback_queries: Vec<String>,

    /// Frequency tier bonus for a card containing `a[href]`
    #[serde(default = "defaults::anchor_bonus")]
    pub anchor_bonus: i64,

    /// Frequency tier bonus for a card containing `img`
    #[serde(default = "defaults::image_bonus")]
    pub image_bonus: i64,

    /// Frequency tier penalty per ancestor of the container
    #[serde(default = "defaults::depth_penalty")]
    pub depth_penalty: i64,

    /// Category name to result-producing queries, tried pairwise in order
    #[serde(default = "defaults::category_queries")]
    pub category_queries: HashMap<String, Vec<String>>,
}

impl DiscoveryConfig {
    /// Result-producing queries for a category.
    pub fn queries_for(&self, category: &str) -> &[String] {
        self.category_queries
            .get(category)
            .filter(|queries| !queries.is_empty())
            .unwrap_or(&self.fallback_queries)
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            invalid_query: defaults::invalid_query(),
            fallback_queries: defaults::fallback_queries(),
            category_queries: defaults::category_queries(),
            anchor_bonus: defaults::anchor_bonus(),
            image_bonus: defaults::image_bonus(),
            depth_penalty: defaults::depth_penalty(),
        }
    }
}

/// Result extraction rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Path segments marking category/breadcrumb links rather than results
    #[serde(default = "defaults::skip_keywords")]
    pub skip_keywords: Vec<String>,

    /// Results scoring below this are dropped (0 keeps everything)
    #[serde(default)]
    pub min_score: i32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            skip_keywords: defaults::skip_keywords(),
            min_score: 0,
        }
    }
}

/// Live search and result cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum sites queried concurrently for one search
    #[serde(default = "defaults::max_parallelism")]
    pub max_parallelism: usize,

    /// Wall-clock budget for a whole query
    #[serde(default = "defaults::search_timeout")]
    pub search_timeout_secs: u64,

    /// How long a completed search stays in memory for trailing subscribers
    #[serde(default = "defaults::grace_period")]
    pub grace_period_secs: u64,

    /// How long a stored result set is served before it expires
    #[serde(default = "defaults::retention_hours")]
    pub retention_hours: u64,
}

impl SearchConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_parallelism: defaults::max_parallelism(),
            search_timeout_secs: defaults::search_timeout(),
            grace_period_secs: defaults::grace_period(),
            retention_hours: defaults::retention_hours(),
        }
    }
}

mod defaults {
    use std::collections::HashMap;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_6) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.4 Safari/605.1.15".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn max_concurrent() -> usize {
        10
    }

    // Discovery defaults
    pub fn invalid_query() -> String {
        "asdfghjklqwerty12345".into()
    }
    pub fn fallback_queries() -> Vec<String> {
        vec!["the".into(), "of".into()]
    }
    pub fn category_queries() -> HashMap<String, Vec<String>> {
        HashMap::from([
            ("Books".to_string(), vec!["murder".into(), "love".into()]),
            ("Movies".to_string(), vec!["love".into(), "war".into()]),
            ("Games".to_string(), vec!["war".into(), "space".into()]),
        ])
    }
    pub fn anchor_bonus() -> i64 {
        40
    }
    pub fn image_bonus() -> i64 {
        15
    }
    pub fn depth_penalty() -> i64 {
        4
    }

    // Extraction defaults
    pub fn skip_keywords() -> Vec<String> {
        vec![
            "category".into(),
            "categories".into(),
            "genre".into(),
            "genres".into(),
            "tag".into(),
            "tags".into(),
            "author".into(),
            "page".into(),
        ]
    }

    // Search defaults
    pub fn max_parallelism() -> usize {
        32
    }
    pub fn search_timeout() -> u64 {
        30
    }
    pub fn grace_period() -> u64 {
        300
    }
    pub fn retention_hours() -> u64 {
        24
    }
}
