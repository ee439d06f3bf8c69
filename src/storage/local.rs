//! Local filesystem storage implementation.
//!
//! Result sets live under `results/` named by the SHA-256 of their query, so
//! any query string maps to a safe, fixed-length file name. The link catalog
//! sits next to them at the storage root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{SearchLink, StoredLinks, StoredResultSet};
use crate::storage::{DEFAULT_RETENTION_HOURS, ResultStore};

const RESULTS_DIR: &str = "results";
const SEARCH_LINKS_FILE: &str = "search_links.json";
const LINKS_FILE: &str = "links.json";
const CONFIG_FILE: &str = "config.toml";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
    retention: chrono::Duration,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            retention: chrono::Duration::hours(DEFAULT_RETENTION_HOURS),
        }
    }

    /// Override how long cached result sets stay valid.
    pub fn with_retention(mut self, retention: chrono::Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Path of the configuration file inside the storage root.
    pub fn config_path(&self) -> PathBuf {
        self.path(CONFIG_FILE)
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Storage key of a query's result set.
    fn result_key(query: &str) -> String {
        let digest = Sha256::digest(query.as_bytes());
        format!("{RESULTS_DIR}/{}.json", hex::encode(digest))
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Write JSON data.
    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read JSON data.
    async fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load the websites and search URL templates to run discovery on.
    pub async fn load_search_links(&self) -> Result<Vec<SearchLink>> {
        self.read_json(SEARCH_LINKS_FILE).await?.ok_or_else(|| {
            AppError::config(format!(
                "{} not found",
                self.path(SEARCH_LINKS_FILE).display()
            ))
        })
    }

    pub async fn save_search_links(&self, links: &[SearchLink]) -> Result<()> {
        self.write_json(SEARCH_LINKS_FILE, links).await
    }

    /// Load the discovered link catalog, if discovery has run.
    pub async fn load_links(&self) -> Result<Option<StoredLinks>> {
        self.read_json(LINKS_FILE).await
    }

    pub async fn save_links(&self, links: &StoredLinks) -> Result<()> {
        self.write_json(LINKS_FILE, links).await?;
        log::info!(
            "Catalog: {} of {} links written to {}",
            links.valid_links_count,
            links.search_links_count,
            LINKS_FILE
        );
        Ok(())
    }
}

#[async_trait]
impl ResultStore for LocalStorage {
    async fn get(&self, query: &str) -> Result<Option<StoredResultSet>> {
        let key = Self::result_key(query);
        let Some(set) = self.read_json::<StoredResultSet>(&key).await? else {
            return Ok(None);
        };
        if set.query != query || set.is_expired(self.retention, Utc::now()) {
            return Ok(None);
        }
        Ok(Some(set))
    }

    async fn put(&self, set: &StoredResultSet) -> Result<()> {
        let key = Self::result_key(&set.query);
        self.write_json(&key, set).await?;
        log::debug!("Stored {} results for '{}'", set.results.len(), set.query);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        let dir = self.path(RESULTS_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(AppError::Io(e)),
        };

        let now = Utc::now();
        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let expired = match serde_json::from_slice::<StoredResultSet>(&bytes) {
                Ok(set) => set.is_expired(self.retention, now),
                Err(e) => {
                    log::warn!("Removing unreadable result set {}: {}", path.display(), e);
                    true
                }
            };
            if expired {
                tokio::fs::remove_file(&path).await?;
                removed += 1;
            }
        }

        log::info!("Purged {removed} expired result sets");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Link, SearchResult, WebsiteLink};
    use tempfile::TempDir;

    fn result(title: &str, score: i32) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            result_url: format!("https://example.com/{title}"),
            category: "Movies".to_string(),
            website_title: "Example".to_string(),
            website_url: "https://example.com".to_string(),
            website_starred: false,
            score,
            year: Some(1999),
            image_url: None,
            alt_text: None,
        }
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.read_bytes("nope.txt").await.unwrap().is_none());
        assert!(storage.get("never searched").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_result_set_round_trip() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let set = StoredResultSet::new("the matrix", vec![result("b", 80), result("a", 101)]);
        storage.put(&set).await.unwrap();

        let loaded = storage.get("the matrix").await.unwrap().unwrap();
        assert_eq!(loaded.results[0].title, "a");
        assert_eq!(loaded.results[1].year, Some(1999));
        // Keys are exact query strings.
        assert!(storage.get("The Matrix").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_sets_are_hidden_and_purged() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path()).with_retention(chrono::Duration::hours(1));

        let mut old = StoredResultSet::new("old", vec![result("x", 50)]);
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        storage.put(&old).await.unwrap();
        storage
            .put(&StoredResultSet::new("fresh", vec![]))
            .await
            .unwrap();

        assert!(storage.get("old").await.unwrap().is_none());
        assert_eq!(storage.purge_expired().await.unwrap(), 1);
        assert!(storage.get("fresh").await.unwrap().is_some());
        assert_eq!(storage.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_catalog_files() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        assert!(storage.load_search_links().await.is_err());
        assert!(storage.load_links().await.unwrap().is_none());

        let search_link = SearchLink::new(
            WebsiteLink {
                title: "Example".to_string(),
                url: "https://example.com".to_string(),
                category: "Movies".to_string(),
                starred: false,
            },
            "https://example.com/?s={0}",
        );
        storage
            .save_search_links(std::slice::from_ref(&search_link))
            .await
            .unwrap();
        assert_eq!(storage.load_search_links().await.unwrap(), vec![search_link.clone()]);

        let stored = StoredLinks::new(1, vec![Link::new(search_link, "ul > li", 42)]);
        storage.save_links(&stored).await.unwrap();
        let loaded = storage.load_links().await.unwrap().unwrap();
        assert_eq!(loaded.valid_links_count, 1);
        assert_eq!(loaded.links["Movies"][0].card_selector, "ul > li");
    }
}
