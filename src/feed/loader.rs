//! Fetch coordination and result finalization.
//!
//! [`FeedLoader::load`] spawns one task per source, waits for them against a
//! single shared deadline, then merges, sorts and caps the items.
//!
//! # Deadline behavior
//!
//! Tasks are awaited in launch order. Each wait gets whatever is left of the
//! global budget; once it is spent, remaining tasks are abandoned. Abandoned
//! tasks are detached rather than aborted: they run to completion in the
//! background but their items are never merged.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::fetcher::{fetch_source, FetchError, FetchResult};
use super::item::{accept_all, FeedItem, ItemFilter};
use super::source::{resolve_source, FeedSource, ResolvedSource};
use super::transport::FeedTransport;

/// Default wall-clock budget for one load.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Deadline used when `now + timeout` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// Knobs for one load.
#[derive(Clone)]
pub struct LoadOptions {
    /// Cap on items per source and in the final result (0 = unlimited)
    pub max_items: usize,
    /// Sort newest first before capping
    pub sort: bool,
    /// Called with `(link, title, published_at)` for every parsed item
    pub filter: ItemFilter,
    /// Wall-clock budget shared by all sources
    pub timeout: Duration,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_items: 0,
            sort: true,
            filter: accept_all(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl fmt::Debug for LoadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadOptions")
            .field("max_items", &self.max_items)
            .field("sort", &self.sort)
            .field("filter", &"<fn>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LoadOptions {
    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items;
        self
    }

    pub fn with_sorting(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&str, &str, DateTime<Utc>) -> bool + Send + Sync + 'static,
    {
        self.filter = Arc::new(filter);
        self
    }
}

/// Everything one load produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateResult {
    /// Items from every source that answered in time, newest first when sorted
    pub items: Vec<FeedItem>,
    /// Sources for which no endpoint candidate worked, each listed once
    pub errored_sources: Vec<FeedSource>,
    /// Sources still running when the budget ran out
    pub timed_out: Vec<FeedSource>,
    /// True when at least one item was collected
    pub success: bool,
}

/// Loads many feeds concurrently through one [`FeedTransport`].
#[derive(Clone)]
pub struct FeedLoader {
    transport: Arc<dyn FeedTransport>,
    options: LoadOptions,
}

impl FeedLoader {
    pub fn new(transport: Arc<dyn FeedTransport>, options: LoadOptions) -> Self {
        Self { transport, options }
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    /// Fetches and parses every non-blank source in `urls`.
    ///
    /// Never fails: per-source problems end up in
    /// [`AggregateResult::errored_sources`] or [`AggregateResult::timed_out`].
    pub async fn load<I, S>(&self, urls: I) -> AggregateResult
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.options.timeout)
            .unwrap_or_else(|| start + FAR_FUTURE);

        let tasks: Vec<(ResolvedSource, JoinHandle<FetchResult>)> = urls
            .into_iter()
            .filter(|raw| !raw.as_ref().trim().is_empty())
            .map(|raw| {
                let resolved = resolve_source(raw.as_ref());
                let handle = self.spawn_fetch(resolved.clone());
                (resolved, handle)
            })
            .collect();

        tracing::debug!(sources = tasks.len(), budget = ?self.options.timeout, "Loading feeds");

        let mut results = Vec::with_capacity(tasks.len());
        let mut timed_out = Vec::new();

        for (resolved, handle) in tasks {
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(result)) => results.push(result),
                Ok(Err(join_error)) => {
                    tracing::warn!(
                        source = %resolved.base_url,
                        error = %join_error,
                        "Feed fetch task failed"
                    );
                    results.push(FetchResult {
                        source: resolved.base_source(),
                        result: Err(FetchError::TaskFailed(join_error.to_string())),
                    });
                }
                Err(_) => {
                    tracing::warn!(
                        source = %resolved.base_url,
                        elapsed = ?start.elapsed(),
                        "Feed source still loading at deadline, abandoning"
                    );
                    timed_out.push(resolved.base_source());
                }
            }
        }

        finalize(results, timed_out, &self.options)
    }

    /// Runs [`FeedLoader::load`] in the background and hands the result to
    /// `on_finished`.
    pub fn spawn<F>(&self, urls: Vec<String>, on_finished: F) -> JoinHandle<()>
    where
        F: FnOnce(AggregateResult) + Send + 'static,
    {
        let loader = self.clone();
        tokio::spawn(async move {
            let result = loader.load(urls).await;
            on_finished(result);
        })
    }

    fn spawn_fetch(&self, resolved: ResolvedSource) -> JoinHandle<FetchResult> {
        let transport = Arc::clone(&self.transport);
        let filter = Arc::clone(&self.options.filter);
        let max_items = self.options.max_items;

        tokio::spawn(async move {
            fetch_source(transport.as_ref(), &resolved, &filter, max_items).await
        })
    }
}

/// Convenience wrapper for a one-off load.
pub async fn load_feeds<I, S>(
    transport: Arc<dyn FeedTransport>,
    urls: I,
    options: LoadOptions,
) -> AggregateResult
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    FeedLoader::new(transport, options).load(urls).await
}

/// Merges per-source results in arrival order, then sorts and caps.
///
/// Sorting is stable, so items with equal timestamps keep arrival order
/// (source launch order, then document order).
pub fn finalize(
    results: Vec<FetchResult>,
    timed_out: Vec<FeedSource>,
    options: &LoadOptions,
) -> AggregateResult {
    let mut items = Vec::new();
    let mut errored_sources: Vec<FeedSource> = Vec::new();

    for FetchResult { source, result } in results {
        match result {
            Ok(batch) => items.extend(batch),
            Err(e) => {
                tracing::warn!(
                    source = %source.display_name,
                    url = %source.canonical_url,
                    error = %e,
                    "Feed source failed"
                );
                if !errored_sources
                    .iter()
                    .any(|s| s.canonical_url == source.canonical_url)
                {
                    errored_sources.push(source);
                }
            }
        }
    }

    if options.sort {
        items.sort_by(|a, b| b.published_at.cmp(&a.published_at));
    }

    if options.max_items != 0 && items.len() > options.max_items {
        items.truncate(options.max_items);
    }

    AggregateResult {
        success: !items.is_empty(),
        items,
        errored_sources,
        timed_out,
    }
}
