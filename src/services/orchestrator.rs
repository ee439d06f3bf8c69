// src/services/orchestrator.rs

//! Query coalescing and streaming.
//!
//! Concurrent callers asking for the same query share one background search.
//! Each caller gets everything buffered so far and then follows the search
//! live; callers arriving after completion get the score-sorted final set.
//! Completed searches are persisted to the [`ResultStore`] and served from
//! there until they expire.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::models::{SearchConfig, SearchResult, StoredResultSet, sort_by_score};
use crate::services::ranking::normalize;
use crate::services::search::Searcher;
use crate::storage::ResultStore;

#[derive(Debug, Default)]
struct StreamState {
    /// Arrival order; only ever appended to
    buffer: Vec<SearchResult>,
    /// Score-sorted copy of `buffer`, set on completion
    sorted: Option<Arc<Vec<SearchResult>>>,
}

/// Shared state of one running (or recently finished) query.
///
/// A single writer appends results; any number of subscribers read them.
#[derive(Debug)]
pub struct SearchStream {
    query: String,
    state: Mutex<StreamState>,
    /// Bumped on every append and on completion
    version: watch::Sender<usize>,
}

impl SearchStream {
    pub fn new(query: impl Into<String>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            query: query.into(),
            state: Mutex::new(StreamState::default()),
            version,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn is_completed(&self) -> bool {
        self.lock().sorted.is_some()
    }

    /// Number of results received so far.
    pub fn len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Results received so far, in arrival order.
    pub fn snapshot(&self) -> Vec<SearchResult> {
        self.lock().buffer.clone()
    }

    /// Append a result and wake subscribers. Ignored once completed.
    pub fn push(&self, result: SearchResult) {
        {
            let mut state = self.lock();
            if state.sorted.is_some() {
                return;
            }
            state.buffer.push(result);
        }
        self.version.send_modify(|v| *v += 1);
    }

    /// Freeze the buffer and return its score-sorted snapshot.
    pub fn complete(&self) -> Arc<Vec<SearchResult>> {
        let sorted = {
            let mut state = self.lock();
            if let Some(sorted) = &state.sorted {
                return Arc::clone(sorted);
            }
            let mut results = state.buffer.clone();
            sort_by_score(&mut results);
            let sorted = Arc::new(results);
            state.sorted = Some(Arc::clone(&sorted));
            sorted
        };
        self.version.send_modify(|v| *v += 1);
        sorted
    }

    /// Follow this query's results.
    ///
    /// Before completion: the buffered results in arrival order, then each
    /// new result as it arrives, ending when the search completes. After
    /// completion: the final set, best first.
    pub fn subscribe(self: &Arc<Self>) -> BoxStream<'static, SearchResult> {
        if let Some(sorted) = self.lock().sorted.clone() {
            let results: Vec<SearchResult> = sorted.as_ref().clone();
            return stream::iter(results).boxed();
        }

        let subscription = Subscription {
            stream: Arc::clone(self),
            changes: self.version.subscribe(),
            cursor: 0,
            pending: VecDeque::new(),
        };
        stream::unfold(subscription, Subscription::next).boxed()
    }

    fn lock(&self) -> MutexGuard<'_, StreamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One caller's read position in a [`SearchStream`].
struct Subscription {
    stream: Arc<SearchStream>,
    changes: watch::Receiver<usize>,
    cursor: usize,
    pending: VecDeque<SearchResult>,
}

impl Subscription {
    async fn next(mut self) -> Option<(SearchResult, Self)> {
        loop {
            if let Some(result) = self.pending.pop_front() {
                return Some((result, self));
            }

            // Mark the current version seen before reading, so an append that
            // lands after the read always triggers `changed()`.
            self.changes.borrow_and_update();
            let completed = {
                let state = self.stream.lock();
                self.pending
                    .extend(state.buffer[self.cursor..].iter().cloned());
                self.cursor = state.buffer.len();
                state.sorted.is_some()
            };

            if !self.pending.is_empty() {
                continue;
            }
            if completed || self.changes.changed().await.is_err() {
                return None;
            }
        }
    }
}

/// Entry point for searches: cache lookup, coalescing and background runs.
#[derive(Clone)]
pub struct QueryOrchestrator {
    searcher: Arc<dyn Searcher>,
    store: Arc<dyn ResultStore>,
    registry: Arc<DashMap<String, Arc<SearchStream>>>,
    search_timeout: Duration,
    grace_period: Duration,
}

impl QueryOrchestrator {
    pub fn new(searcher: Arc<dyn Searcher>, store: Arc<dyn ResultStore>, settings: &SearchConfig) -> Self {
        Self {
            searcher,
            store,
            registry: Arc::new(DashMap::new()),
            search_timeout: settings.search_timeout(),
            grace_period: settings.grace_period(),
        }
    }

    /// Number of queries currently running or within their grace period.
    pub fn active_queries(&self) -> usize {
        self.registry.len()
    }

    /// Stream results for a query, starting a search only if none is stored
    /// or running for the exact same query string.
    pub async fn get_or_start(&self, query: &str) -> BoxStream<'static, SearchResult> {
        match self.store.get(query).await {
            Ok(Some(set)) => {
                log::info!("Serving {} stored results for '{query}'", set.results.len());
                return stream::iter(set.results).boxed();
            }
            Ok(None) => {}
            Err(e) => log::warn!("Result store lookup failed for '{query}': {e}"),
        }

        let (search, started) = match self.registry.entry(query.to_string()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), None),
            Entry::Vacant(entry) => {
                let search = Arc::new(SearchStream::new(query));
                entry.insert(Arc::clone(&search));

                let cancel = CancellationToken::new();
                let receiver = self.searcher.search(&normalize(query), cancel.clone());
                (search, Some((receiver, cancel)))
            }
        };

        match started {
            Some((receiver, cancel)) => {
                log::info!("Starting search for '{query}'");
                tokio::spawn(self.clone().run(Arc::clone(&search), receiver, cancel));
            }
            None => log::debug!("Joining running search for '{query}'"),
        }

        search.subscribe()
    }

    /// Drain the searcher into the shared stream until it finishes or the
    /// timeout hits, then persist and schedule removal.
    async fn run(
        self,
        search: Arc<SearchStream>,
        mut receiver: mpsc::UnboundedReceiver<SearchResult>,
        cancel: CancellationToken,
    ) {
        let deadline = tokio::time::sleep(self.search_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                received = receiver.recv() => match received {
                    Some(result) => search.push(result),
                    None => break,
                },
                _ = &mut deadline => {
                    log::warn!(
                        "Search for '{}' timed out after {:?}",
                        search.query(),
                        self.search_timeout
                    );
                    cancel.cancel();
                    while let Ok(result) = receiver.try_recv() {
                        search.push(result);
                    }
                    break;
                }
            }
        }

        let set = StoredResultSet::new(search.query(), search.snapshot());
        if let Err(e) = self.store.put(&set).await {
            log::warn!("Failed to store results for '{}': {e}", search.query());
        }

        let results = search.complete();
        log::info!("Search for '{}' completed with {} results", search.query(), results.len());

        tokio::time::sleep(self.grace_period).await;
        self.registry
            .remove_if(search.query(), |_, current| Arc::ptr_eq(current, &search));
    }
}
