// src/services/search.rs

//! Concurrent fan-out of one query across every cataloged site.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use scraper::Html;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, Result};
use crate::models::{Config, Link, SearchResult};
use crate::services::extractor::{ResultExtractor, parse_selector};
use crate::utils::http::{create_async_client, fetch_text};

/// Anything that can run a live search over a set of sites.
///
/// The returned channel yields results as they are extracted and closes once
/// every site has finished or the token is cancelled.
pub trait Searcher: Send + Sync {
    fn search(
        &self,
        normalized_query: &str,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<SearchResult>;
}

/// Searches the link catalog with bounded parallelism.
#[derive(Clone)]
pub struct SearchExecutor {
    client: reqwest::Client,
    catalog: Arc<Vec<Link>>,
    extractor: Arc<ResultExtractor>,
    max_parallelism: usize,
}

impl SearchExecutor {
    /// Create an executor; the catalog is ordered fastest site first.
    pub fn new(
        client: reqwest::Client,
        mut catalog: Vec<Link>,
        extractor: ResultExtractor,
        max_parallelism: usize,
    ) -> Self {
        catalog.sort_by_key(|link| link.response_time_ms);
        Self {
            client,
            catalog: Arc::new(catalog),
            extractor: Arc::new(extractor),
            max_parallelism: max_parallelism.max(1),
        }
    }

    /// Create an executor with a client and extraction rules built from config.
    pub fn from_config(config: &Config, catalog: Vec<Link>) -> Result<Self> {
        Ok(Self::new(
            create_async_client(&config.crawler)?,
            catalog,
            ResultExtractor::new(&config.extraction),
            config.search.max_parallelism,
        ))
    }

    pub fn catalog(&self) -> &[Link] {
        &self.catalog
    }
}

impl Searcher for SearchExecutor {
    fn search(
        &self,
        normalized_query: &str,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<SearchResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = self.client.clone();
        let catalog = Arc::clone(&self.catalog);
        let extractor = Arc::clone(&self.extractor);
        let parallelism = self.max_parallelism;
        let query = normalized_query.to_string();

        tokio::spawn(async move {
            let sites = catalog.len();
            let jobs = catalog.iter().cloned().map(|link| {
                let client = client.clone();
                let extractor = Arc::clone(&extractor);
                let query = query.clone();
                let tx = tx.clone();
                let cancel = cancel.clone();
                async move { search_site(&client, &extractor, &link, &query, &tx, &cancel).await }
            });

            let mut site_stream = stream::iter(jobs).buffer_unordered(parallelism);
            let mut found = 0usize;
            while let Some(sent) = site_stream.next().await {
                found += sent;
            }
            drop(site_stream);

            if cancel.is_cancelled() {
                log::info!("Search '{query}' cancelled with {found} results");
            } else {
                log::info!("Search '{query}' finished: {found} results from {sites} sites");
            }
            // `tx` drops here, closing the channel.
        });

        rx
    }
}

/// Run one site and log its outcome. A broken site only costs its own results.
async fn search_site(
    client: &reqwest::Client,
    extractor: &ResultExtractor,
    link: &Link,
    query: &str,
    tx: &mpsc::UnboundedSender<SearchResult>,
    cancel: &CancellationToken,
) -> usize {
    match fetch_and_forward(client, extractor, link, query, tx, cancel).await {
        Ok(sent) => {
            log::debug!("{}: {sent} results", link.title);
            sent
        }
        Err(AppError::Cancelled) => {
            log::debug!("{}: abandoned after cancellation", link.title);
            0
        }
        Err(e) => {
            log::warn!("{}: search failed: {e}", link.title);
            0
        }
    }
}

async fn fetch_and_forward(
    client: &reqwest::Client,
    extractor: &ResultExtractor,
    link: &Link,
    query: &str,
    tx: &mpsc::UnboundedSender<SearchResult>,
    cancel: &CancellationToken,
) -> Result<usize> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }
    let url = link.search_url_for(query)?;

    let html = tokio::select! {
        _ = cancel.cancelled() => return Err(AppError::Cancelled),
        body = fetch_text(client, &url) => body?,
    };

    forward_results(extractor, &html, query, link, tx)
}

/// Parse and extract synchronously; the parsed document never crosses an await.
fn forward_results(
    extractor: &ResultExtractor,
    html: &str,
    query: &str,
    link: &Link,
    tx: &mpsc::UnboundedSender<SearchResult>,
) -> Result<usize> {
    let page = Html::parse_document(html);
    let selector = parse_selector(&link.card_selector)?;

    let mut sent = 0;
    for result in extractor.extract(&page, &selector, query, link)? {
        if tx.send(result).is_err() {
            // Receiver gone; nobody is listening any more.
            break;
        }
        sent += 1;
    }
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(title: &str, search_url: &str, response_time_ms: u64) -> Link {
        Link {
            title: title.to_string(),
            url: "http://127.0.0.1:9".to_string(),
            category: "Books".to_string(),
            starred: false,
            search_url: search_url.to_string(),
            card_selector: "ul > li".to_string(),
            response_time_ms,
        }
    }

    fn executor(catalog: Vec<Link>) -> SearchExecutor {
        SearchExecutor::from_config(&Config::default(), catalog).unwrap()
    }

    #[test]
    fn test_catalog_sorted_fastest_first() {
        let executor = executor(vec![
            link("slow", "http://127.0.0.1:9/?q={0}", 800),
            link("fast", "http://127.0.0.1:9/?q={0}", 20),
        ]);
        assert_eq!(executor.catalog()[0].title, "fast");
    }

    #[test]
    fn test_forward_results_sends_every_card() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let html = r#"<ul><li><a href="/a">Dune</a></li><li><a href="/b">Dune Messiah</a></li></ul>"#;
        let site = link("site", "http://127.0.0.1:9/?q={0}", 1);

        let sent = forward_results(&ResultExtractor::default(), html, "dune", &site, &tx).unwrap();
        assert_eq!(sent, 2);
        assert_eq!(rx.try_recv().unwrap().title, "Dune");
        assert_eq!(rx.try_recv().unwrap().title, "Dune Messiah");
    }

    #[test]
    fn test_forward_results_rejects_bad_selector() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut site = link("site", "http://127.0.0.1:9/?q={0}", 1);
        site.card_selector = "li[".to_string();
        assert!(forward_results(&ResultExtractor::default(), "<ul></ul>", "q", &site, &tx).is_err());
    }

    #[tokio::test]
    async fn test_empty_catalog_closes_channel() {
        let mut rx = executor(vec![]).search("dune", CancellationToken::new());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancelled_search_starts_no_fetches() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut rx = executor(vec![link("site", "http://127.0.0.1:9/?q={0}", 1)])
            .search("dune", cancel);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_broken_template_only_skips_that_site() {
        let mut rx = executor(vec![link("broken", "http://127.0.0.1:9/search", 1)])
            .search("dune", CancellationToken::new());
        assert!(rx.recv().await.is_none());
    }
}
