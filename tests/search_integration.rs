//! End-to-end tests against local HTTP fixtures.
//!
//! Each test stands up wiremock servers that play the part of searchable
//! sites, then drives catalog discovery, the executor or the orchestrator
//! against them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use spyglass::models::{Config, Link, SearchConfig, SearchLink, SearchResult, WebsiteLink};
use spyglass::services::{QueryOrchestrator, SearchExecutor, Searcher};
use spyglass::storage::{MemoryStorage, ResultStore};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const NO_RESULTS_PAGE: &str = "<html><body><ul><li>No results</li></ul></body></html>";

const RESULTS_PAGE: &str = r#"<html><body>
    <ul>
        <li class="card"><a href="/x">Foo</a></li>
        <li class="card"><a href="/y">Foo Bar</a></li>
    </ul>
</body></html>"#;

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body.to_string(), "text/html; charset=utf-8")
}

async fn mount_results(server: &MockServer, query: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", query))
        .respond_with(html(body))
        .mount(server)
        .await;
}

fn site(server: &MockServer, title: &str, category: &str) -> SearchLink {
    SearchLink::new(
        WebsiteLink {
            title: title.to_string(),
            url: server.uri(),
            category: category.to_string(),
            starred: false,
        },
        format!("{}/search?q={{0}}", server.uri()),
    )
}

fn cataloged(server: &MockServer, title: &str) -> Link {
    Link::new(site(server, title, "Books"), "ul > li.card", 10)
}

fn executor(catalog: Vec<Link>) -> SearchExecutor {
    SearchExecutor::from_config(&Config::default(), catalog).unwrap()
}

async fn collect_sorted(executor: &SearchExecutor, query: &str) -> Vec<SearchResult> {
    let mut rx = executor.search(query, CancellationToken::new());
    let mut results = Vec::new();
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results.sort_by(|a, b| b.score.cmp(&a.score));
    results
}

#[cfg(feature = "discover")]
#[tokio::test]
async fn test_discovered_selector_ranks_exact_title_first() {
    let server = MockServer::start().await;
    mount_results(&server, "asdfghjklqwerty12345", NO_RESULTS_PAGE).await;
    mount_results(&server, "murder", RESULTS_PAGE).await;
    mount_results(&server, "love", RESULTS_PAGE).await;
    mount_results(&server, "foo bar", RESULTS_PAGE).await;

    let config = Config::default();
    let client = spyglass::utils::http::create_async_client(&config.crawler).unwrap();
    let stored =
        spyglass::pipeline::build_catalog(&config, &client, vec![site(&server, "Fixture", "Books")])
            .await;

    assert_eq!(stored.search_links_count, 1);
    assert_eq!(stored.valid_links_count, 1);
    let catalog = stored.into_catalog();
    assert_eq!(catalog[0].card_selector, "ul > li.card");

    let results = collect_sorted(&executor(catalog), "foo bar").await;
    let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Foo Bar", "Foo"]);
    assert_eq!(results[0].result_url, format!("{}/y", server.uri()));
    assert!(results[0].score > results[1].score);
}

#[cfg(feature = "discover")]
#[tokio::test]
async fn test_unreachable_site_is_dropped_from_catalog() {
    let good = MockServer::start().await;
    mount_results(&good, "asdfghjklqwerty12345", NO_RESULTS_PAGE).await;
    mount_results(&good, "the", RESULTS_PAGE).await;
    mount_results(&good, "of", RESULTS_PAGE).await;

    // Answers every request with a 503.
    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&broken)
        .await;

    let config = Config::default();
    let client = spyglass::utils::http::create_async_client(&config.crawler).unwrap();
    let stored = spyglass::pipeline::build_catalog(
        &config,
        &client,
        vec![site(&good, "Good", "Podcasts"), site(&broken, "Broken", "Podcasts")],
    )
    .await;

    assert_eq!(stored.search_links_count, 2);
    assert_eq!(stored.valid_links_count, 1);
    assert_eq!(stored.links["Podcasts"][0].title, "Good");
}

#[cfg(feature = "discover")]
#[tokio::test]
async fn test_half_fetched_query_pair_is_not_trusted() {
    let server = MockServer::start().await;
    mount_results(&server, "asdfghjklqwerty12345", NO_RESULTS_PAGE).await;
    mount_results(&server, "the", RESULTS_PAGE).await;
    // "of" is never mounted, so it answers 404.

    let config = Config::default();
    let client = spyglass::utils::http::create_async_client(&config.crawler).unwrap();
    let stored =
        spyglass::pipeline::build_catalog(&config, &client, vec![site(&server, "Half", "Software")])
            .await;
    assert_eq!(stored.valid_links_count, 0);
}

#[cfg(feature = "discover")]
#[tokio::test]
async fn test_next_query_pair_used_after_partial_fetch() {
    let server = MockServer::start().await;
    mount_results(&server, "asdfghjklqwerty12345", NO_RESULTS_PAGE).await;
    mount_results(&server, "the", RESULTS_PAGE).await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "murder"))
        .respond_with(html(RESULTS_PAGE))
        .expect(1)
        .mount(&server)
        .await;
    mount_results(&server, "love", RESULTS_PAGE).await;

    let mut config = Config::default();
    config.discovery.category_queries.insert(
        "Software".to_string(),
        vec!["the".into(), "missing".into(), "murder".into(), "love".into()],
    );
    let client = spyglass::utils::http::create_async_client(&config.crawler).unwrap();
    let stored =
        spyglass::pipeline::build_catalog(&config, &client, vec![site(&server, "Retry", "Software")])
            .await;

    assert_eq!(stored.valid_links_count, 1);
    assert_eq!(stored.into_catalog()[0].card_selector, "ul > li.card");
    server.verify().await;
}

#[tokio::test]
async fn test_parallelism_limit_is_respected() {
    let mut servers = Vec::new();
    for _ in 0..2 {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(html(RESULTS_PAGE).set_delay(Duration::from_millis(300)))
            .mount(&server)
            .await;
        servers.push(server);
    }
    let catalog = vec![cataloged(&servers[0], "One"), cataloged(&servers[1], "Two")];

    let mut config = Config::default();
    config.search.max_parallelism = 1;
    let serial = SearchExecutor::from_config(&config, catalog.clone()).unwrap();
    let started = Instant::now();
    assert_eq!(collect_sorted(&serial, "foo bar").await.len(), 4);
    assert!(started.elapsed() >= Duration::from_millis(600));

    config.search.max_parallelism = 2;
    let parallel = SearchExecutor::from_config(&config, catalog).unwrap();
    let started = Instant::now();
    assert_eq!(collect_sorted(&parallel, "foo bar").await.len(), 4);
    assert!(started.elapsed() < Duration::from_millis(600));
}

#[tokio::test]
async fn test_failing_site_does_not_affect_others() {
    let good = MockServer::start().await;
    mount_results(&good, "foo bar", RESULTS_PAGE).await;

    let broken = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;

    let results = collect_sorted(
        &executor(vec![cataloged(&broken, "Broken"), cataloged(&good, "Good")]),
        "foo bar",
    )
    .await;

    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.website_title == "Good"));
}

#[tokio::test]
async fn test_orchestrator_times_out_slow_sites_and_persists() {
    let fast = MockServer::start().await;
    mount_results(&fast, "foo bar", RESULTS_PAGE).await;

    let slow = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .respond_with(html(RESULTS_PAGE).set_delay(Duration::from_secs(8)))
        .mount(&slow)
        .await;

    let store = Arc::new(MemoryStorage::default());
    let orchestrator = QueryOrchestrator::new(
        Arc::new(executor(vec![cataloged(&fast, "Fast"), cataloged(&slow, "Slow")])),
        store.clone(),
        &SearchConfig {
            search_timeout_secs: 1,
            ..SearchConfig::default()
        },
    );

    let started = Instant::now();
    let results: Vec<SearchResult> = orchestrator.get_or_start("foo bar").await.collect().await;
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.website_title == "Fast"));

    let stored = store.get("foo bar").await.unwrap().unwrap();
    assert_eq!(stored.results.len(), 2);
    assert!(stored.results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn test_coalesced_callers_hit_each_site_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "foo bar"))
        .respond_with(html(RESULTS_PAGE).set_delay(Duration::from_millis(200)))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = QueryOrchestrator::new(
        Arc::new(executor(vec![cataloged(&server, "Only")])),
        Arc::new(MemoryStorage::default()),
        &SearchConfig::default(),
    );

    let streams =
        futures::future::join_all((0..5).map(|_| orchestrator.get_or_start("foo bar"))).await;
    for stream in streams {
        assert_eq!(stream.count().await, 2);
    }

    // A later caller is served from the store.
    assert_eq!(orchestrator.get_or_start("foo bar").await.count().await, 2);
    server.verify().await;
}
