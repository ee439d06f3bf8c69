// src/pipeline/catalog.rs

//! Catalog builder: learns a card selector for every search link.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::{StreamExt, stream};
use reqwest::Client;
use scraper::Html;

use crate::error::{AppError, Result};
use crate::models::{Config, DiscoveryConfig, Link, SearchLink, StoredLinks};
use crate::services::{DiscoveredSelector, DiscoveryFailure, SelectorDiscovery};
use crate::storage::LocalStorage;
use crate::utils::http::fetch_text_timed;

/// Run discovery over `search_links.json` and write `links.json`.
pub async fn run_discovery(
    config: &Config,
    storage: &LocalStorage,
    client: &Client,
) -> Result<StoredLinks> {
    let search_links = storage.load_search_links().await?;
    log::info!("Loaded {} search links", search_links.len());

    let stored = build_catalog(config, client, search_links).await;
    storage.save_links(&stored).await?;
    Ok(stored)
}

/// Discover selectors for every search link; failing sites are dropped.
pub async fn build_catalog(
    config: &Config,
    client: &Client,
    search_links: Vec<SearchLink>,
) -> StoredLinks {
    let total = search_links.len();
    let discovery = Arc::new(SelectorDiscovery::new(&config.discovery));
    let settings = Arc::new(config.discovery.clone());

    let outcomes: Vec<(SearchLink, Result<(DiscoveredSelector, u64)>)> =
        stream::iter(search_links)
            .map(|search_link| {
                let client = client.clone();
                let discovery = Arc::clone(&discovery);
                let settings = Arc::clone(&settings);

                async move {
                    let result = discover_site(&client, &discovery, &settings, &search_link).await;
                    (search_link, result)
                }
            })
            .buffer_unordered(config.crawler.max_concurrent.max(1))
            .collect()
            .await;

    // category -> (valid, invalid)
    let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut links = Vec::new();

    for (search_link, outcome) in outcomes {
        let entry = counts.entry(search_link.category.clone()).or_default();
        match outcome {
            Ok((found, response_time_ms)) => {
                log::debug!(
                    "{}: '{}' via {} analysis ({} cards, {} ms)",
                    search_link.title,
                    found.selector,
                    found.tier,
                    found.card_count,
                    response_time_ms
                );
                entry.0 += 1;
                links.push(Link::new(search_link, found.selector, response_time_ms));
            }
            Err(e) => {
                log::warn!("{}: dropped from catalog: {}", search_link.title, e);
                entry.1 += 1;
            }
        }
    }

    for (category, (valid, invalid)) in &counts {
        log::info!("{category}: {valid} valid, {invalid} invalid");
    }
    log::info!("Discovery complete: {} of {} links usable", links.len(), total);

    StoredLinks::new(total, links)
}

/// Learn one site's card selector and its average response time.
///
/// The empty-results baseline is optional; without it only frequency
/// analysis runs. Query pairs are tried in order until one yields a pattern;
/// a pair with any page that failed to load is skipped whole.
pub async fn discover_site(
    client: &Client,
    discovery: &SelectorDiscovery,
    settings: &DiscoveryConfig,
    search_link: &SearchLink,
) -> Result<(DiscoveredSelector, u64)> {
    let baseline_url = search_link.search_url_for(&settings.invalid_query)?;
    let baseline = match fetch_text_timed(client, &baseline_url).await {
        Ok(fetched) => Some(fetched),
        Err(e) => {
            log::debug!("{}: no baseline page ({e})", search_link.title);
            None
        }
    };

    let queries = settings.queries_for(&search_link.category);
    let mut last_error = AppError::site(&search_link.title, "no results page could be fetched");

    for pair in queries.chunks(2) {
        let mut pages = Vec::with_capacity(pair.len());
        let mut elapsed: Vec<u64> = baseline.iter().map(|(_, ms)| *ms).collect();

        for query in pair {
            let url = search_link.search_url_for(query)?;
            match fetch_text_timed(client, &url).await {
                Ok((html, ms)) => {
                    pages.push(html);
                    elapsed.push(ms);
                }
                Err(e) => log::debug!("{}: fetch failed for '{query}': {e}", search_link.title),
            }
        }
        if pages.len() < pair.len() {
            // Differential analysis needs every page of the pair to agree.
            last_error = AppError::site(
                &search_link.title,
                format!("only {} of {} pages fetched for {pair:?}", pages.len(), pair.len()),
            );
            continue;
        }

        match analyse(discovery, baseline.as_ref().map(|(html, _)| html.as_str()), &pages) {
            Ok(found) => {
                let average = elapsed.iter().sum::<u64>() / elapsed.len().max(1) as u64;
                return Ok((found, average));
            }
            Err(failure) => {
                log::debug!("{}: {failure} for {pair:?}", search_link.title);
                last_error = failure.into();
            }
        }
    }

    Err(last_error)
}

/// Parse and analyse synchronously so parsed documents never cross an await.
fn analyse(
    discovery: &SelectorDiscovery,
    baseline: Option<&str>,
    pages: &[String],
) -> std::result::Result<DiscoveredSelector, DiscoveryFailure> {
    let baseline = baseline.map(Html::parse_document);
    let pages: Vec<Html> = pages.iter().map(|html| Html::parse_document(html)).collect();
    discovery.discover(baseline.as_ref(), &pages)
}
