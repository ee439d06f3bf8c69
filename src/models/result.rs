//! Search result records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One ranked hit extracted from a site's results page.
///
/// `score` is only comparable between results of the same query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub result_url: String,
    pub category: String,
    pub website_title: String,
    pub website_url: String,
    pub website_starred: bool,
    pub score: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_text: Option<String>,
}

/// A completed query's results as persisted in the durable cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredResultSet {
    pub query: String,
    /// Sorted by descending score
    pub results: Vec<SearchResult>,
    pub created_at: DateTime<Utc>,
}

impl StoredResultSet {
    /// Sort results best-first and stamp the set with the current time.
    pub fn new(query: impl Into<String>, mut results: Vec<SearchResult>) -> Self {
        sort_by_score(&mut results);
        Self {
            query: query.into(),
            results,
            created_at: Utc::now(),
        }
    }

    /// Whether the set is older than the retention window.
    pub fn is_expired(&self, retention: chrono::Duration, now: DateTime<Utc>) -> bool {
        self.created_at + retention <= now
    }
}

/// Stable descending sort by score; equal scores keep arrival order.
pub fn sort_by_score(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.score.cmp(&a.score));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(title: &str, score: i32) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            result_url: format!("https://example.com/{title}"),
            category: "Books".to_string(),
            website_title: "Example".to_string(),
            website_url: "https://example.com".to_string(),
            website_starred: false,
            score,
            year: None,
            image_url: None,
            alt_text: None,
        }
    }

    #[test]
    fn test_stored_set_is_sorted_descending() {
        let set = StoredResultSet::new(
            "q",
            vec![result("a", 50), result("b", 99), result("c", 70), result("d", 99)],
        );
        let titles: Vec<_> = set.results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["b", "d", "c", "a"]);
        assert!(set.results.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_expiry() {
        let mut set = StoredResultSet::new("q", vec![]);
        let now = Utc::now();
        set.created_at = now - chrono::Duration::hours(25);
        assert!(set.is_expired(chrono::Duration::hours(24), now));
        set.created_at = now - chrono::Duration::hours(1);
        assert!(!set.is_expired(chrono::Duration::hours(24), now));
    }

    #[test]
    fn test_optional_fields_skipped_in_json() {
        let json = serde_json::to_string(&result("a", 1)).unwrap();
        assert!(!json.contains("image_url"));
        assert!(json.contains("\"website_starred\":false"));
    }
}
