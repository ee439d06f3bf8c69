//! Pipeline entry points.
//!
//! - `run_discovery`: Learn card selectors for every search link
//! - `run_search`: Stream one query's results as NDJSON

#[cfg(feature = "discover")]
pub mod catalog;
pub mod search;

#[cfg(feature = "discover")]
pub use catalog::{build_catalog, run_discovery};
pub use search::run_search;
