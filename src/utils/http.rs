// src/utils/http.rs

//! HTTP client utilities.

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()?;
    Ok(client)
}

/// Fetch a page body, treating non-2xx statuses as errors.
///
/// Returns the raw text; parse it with `scraper::Html` only after the last
/// `.await`, since the parsed document cannot cross threads.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let text = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(text)
}

/// Like [`fetch_text`], also reporting how long the request took.
pub async fn fetch_text_timed(client: &reqwest::Client, url: &str) -> Result<(String, u64)> {
    let started = Instant::now();
    let text = fetch_text(client, url).await?;
    Ok((text, started.elapsed().as_millis() as u64))
}
