// src/models/link.rs

//! Catalog records: a website, its search URL template, and its learned card selector.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Placeholder in a search URL template replaced by the URL-encoded query.
pub const QUERY_PLACEHOLDER: &str = "{0}";

/// A cataloged website.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebsiteLink {
    pub title: String,
    pub url: String,
    pub category: String,
    /// User-pinned priority site
    #[serde(default)]
    pub starred: bool,
}

/// A website together with the URL template of its search results page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchLink {
    pub title: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub starred: bool,
    /// URL with exactly one `{0}` placeholder for the URL-encoded query
    pub search_url: String,
}

impl SearchLink {
    /// Attach a search URL template to a website.
    pub fn new(website: WebsiteLink, search_url: impl Into<String>) -> Self {
        Self {
            title: website.title,
            url: website.url,
            category: website.category,
            starred: website.starred,
            search_url: search_url.into(),
        }
    }

    /// Build the results page URL for a query.
    pub fn search_url_for(&self, query: &str) -> Result<String> {
        format_search_url(&self.search_url, query)
    }
}

/// A searchable site: a search link plus the selector of its result cards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub title: String,
    pub url: String,
    pub category: String,
    #[serde(default)]
    pub starred: bool,
    pub search_url: String,
    /// `"<parent-selector> > <card-selector>"`
    pub card_selector: String,
    /// Average observed latency while discovering the selector
    #[serde(default)]
    pub response_time_ms: u64,
}

impl Link {
    /// Promote a search link once its card selector is known.
    pub fn new(search_link: SearchLink, card_selector: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            title: search_link.title,
            url: search_link.url,
            category: search_link.category,
            starred: search_link.starred,
            search_url: search_link.search_url,
            card_selector: card_selector.into(),
            response_time_ms,
        }
    }

    /// Build the results page URL for a query.
    pub fn search_url_for(&self, query: &str) -> Result<String> {
        format_search_url(&self.search_url, query)
    }
}

/// Catalog file written by the discovery run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoredLinks {
    pub search_links_count: usize,
    pub valid_links_count: usize,
    /// Links grouped by category
    pub links: BTreeMap<String, Vec<Link>>,
}

impl StoredLinks {
    /// Group links by category.
    pub fn new(search_links_count: usize, links: Vec<Link>) -> Self {
        let valid_links_count = links.len();
        let mut grouped: BTreeMap<String, Vec<Link>> = BTreeMap::new();
        for link in links {
            grouped.entry(link.category.clone()).or_default().push(link);
        }
        Self {
            search_links_count,
            valid_links_count,
            links: grouped,
        }
    }

    /// All links, fastest sites first.
    pub fn into_catalog(self) -> Vec<Link> {
        let mut catalog: Vec<Link> = self.links.into_values().flatten().collect();
        catalog.sort_by_key(|link| link.response_time_ms);
        catalog
    }
}

/// Substitute the URL-encoded query into a search URL template.
pub fn format_search_url(template: &str, query: &str) -> Result<String> {
    let placeholders = template.matches(QUERY_PLACEHOLDER).count();
    if placeholders != 1 {
        return Err(AppError::validation(format!(
            "search url '{template}' must contain exactly one {QUERY_PLACEHOLDER} placeholder, found {placeholders}"
        )));
    }
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    Ok(template.replacen(QUERY_PLACEHOLDER, &encoded, 1))
}
