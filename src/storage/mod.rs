//! Storage abstractions for the durable result cache and the link catalog.
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Configuration
//! ├── search_links.json     # Input: websites with search URL templates
//! ├── links.json            # Output of discovery: links with card selectors
//! └── results/              # Cached result sets, one file per query
//!     └── {sha256(query)}.json
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::StoredResultSet;

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;

/// Default retention window for cached result sets.
pub const DEFAULT_RETENTION_HOURS: i64 = 24;

/// Durable cache of completed searches, keyed by the exact query string.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Load a non-expired result set for a query.
    async fn get(&self, query: &str) -> Result<Option<StoredResultSet>>;

    /// Persist a completed result set, replacing any previous one for the query.
    async fn put(&self, set: &StoredResultSet) -> Result<()>;

    /// Drop every expired result set, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize>;
}
