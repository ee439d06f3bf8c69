// src/models/mod.rs

//! Domain models for the search backend.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod link;
mod result;

// Re-export all public types
pub use config::{Config, CrawlerConfig, DiscoveryConfig, ExtractionConfig, SearchConfig};
pub use link::{Link, QUERY_PLACEHOLDER, SearchLink, StoredLinks, WebsiteLink, format_search_url};
pub use result::{SearchResult, StoredResultSet, sort_by_score};
