//! Service layer for the search backend.
//!
//! This module contains the business logic for:
//! - Card selector discovery (`SelectorDiscovery`)
//! - Result extraction and ranking (`ResultExtractor`)
//! - Concurrent multi-site search (`SearchExecutor`)
//! - Query coalescing and streaming (`QueryOrchestrator`)

pub mod discovery;
pub mod extractor;
pub mod orchestrator;
pub mod ranking;
pub mod search;
pub mod signature;

pub use discovery::{DiscoveredSelector, DiscoveryFailure, SelectorDiscovery, Tier};
pub use extractor::{ResultExtractor, parse_selector};
pub use orchestrator::{QueryOrchestrator, SearchStream};
pub use search::{SearchExecutor, Searcher};
