//! Feed aggregator.
//!
//! The aggregator owns the configured fetchers and the current snapshot.
//! [`Aggregator::refresh`] fans out one task per fetcher, merges and
//! deduplicates the results and publishes them to the snapshot, the cache
//! and (optionally) the persistent store. [`Aggregator::get_items`] answers
//! queries from the store, falling back to the snapshot and then the cache.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::AggregatorConfig;
use crate::feed::cache::Cache;
use crate::feed::context::FetchContext;
use crate::feed::fetcher::Fetcher;
use crate::feed::filter::{self, resolve_source_names};
use crate::feed::store::FeedItemStore;
use crate::feed::tagger::Tagger;
use crate::feed::types::{
    merge_tags, normalize_title, AggregatedResponse, FeedItem, FilterParams, SortOrder,
    SourceInfo,
};
use crate::Result;

/// Cache key of the serialized snapshot.
pub const SNAPSHOT_CACHE_KEY: &str = "flyfeed:snapshot";

/// Outcome of one fetch task.
type FetchOutcome = (SourceInfo, Result<Vec<FeedItem>>);

/// Summary of one refresh cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshReport {
    /// Items in the published batch.
    pub items: usize,
    /// Sources that returned items.
    pub succeeded: usize,
    /// Sources that failed or did not report.
    pub failed: usize,
    /// Whether the batch replaced the snapshot.
    pub published: bool,
    /// Rows removed by the retention sweep.
    pub deleted: u64,
}

/// Fan-out fetcher orchestration plus the read path over its results.
pub struct Aggregator {
    fetchers: Vec<Arc<dyn Fetcher>>,
    sources: Vec<SourceInfo>,
    tagger: Arc<dyn Tagger>,
    cache: Arc<dyn Cache>,
    store: Option<Arc<dyn FeedItemStore>>,
    snapshot: RwLock<Arc<Vec<FeedItem>>>,
    retention_days: AtomicI64,
    cache_ttl: Duration,
    keep_snapshot_on_total_failure: bool,
}

impl Aggregator {
    /// Create an aggregator without a persistent store.
    pub fn new(
        fetchers: Vec<Arc<dyn Fetcher>>,
        tagger: Arc<dyn Tagger>,
        cache: Arc<dyn Cache>,
        config: &AggregatorConfig,
    ) -> Self {
        let sources = fetchers.iter().map(|f| f.source_info()).collect();
        Self {
            fetchers,
            sources,
            tagger,
            cache,
            store: None,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            retention_days: AtomicI64::new(config.retention_days),
            cache_ttl: Duration::from_secs(config.cache_ttl_hours.saturating_mul(3600)),
            keep_snapshot_on_total_failure: config.keep_snapshot_on_total_failure,
        }
    }

    /// Attach a persistent store.
    pub fn with_store(mut self, store: Arc<dyn FeedItemStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Change the retention threshold; `<= 0` disables the sweep.
    pub fn set_retention_days(&self, days: i64) {
        self.retention_days.store(days, Ordering::Relaxed);
    }

    /// Current retention threshold in days.
    pub fn retention_days(&self) -> i64 {
        self.retention_days.load(Ordering::Relaxed)
    }

    /// Descriptors of the configured sources.
    pub fn get_sources(&self) -> Vec<SourceInfo> {
        self.sources.clone()
    }

    /// The current snapshot, without cache warming.
    pub async fn snapshot(&self) -> Arc<Vec<FeedItem>> {
        self.snapshot.read().await.clone()
    }

    /// Run one refresh cycle.
    ///
    /// Source failures are logged and skipped. Only persistence failures are
    /// returned, after the snapshot and cache have been updated.
    pub async fn refresh(&self, ctx: &FetchContext) -> Result<RefreshReport> {
        let started = std::time::Instant::now();
        let mut results = self.spawn_fetches(ctx);

        let mut collected = Vec::new();
        let mut succeeded = 0;
        while let Some((info, result)) = results.recv().await {
            match result {
                Ok(items) => {
                    debug!("Source {} returned {} item(s)", info.name, items.len());
                    succeeded += 1;
                    for mut item in items {
                        let inferred = self.tagger.infer_tags(&item.title, &item.summary);
                        item.tags = merge_tags(&item.tags, &inferred);
                        collected.push(item);
                    }
                }
                Err(e) => warn!("Skipping source {}: {}", info.name, e),
            }
        }

        let mut report = RefreshReport {
            succeeded,
            failed: self.fetchers.len() - succeeded,
            ..Default::default()
        };

        let mut batch = dedup_items(collected);
        filter::sort_items(&mut batch, SortOrder::Newest);
        report.items = batch.len();

        let publish = succeeded > 0 || !self.keep_snapshot_on_total_failure;
        let batch = Arc::new(batch);
        if publish {
            *self.snapshot.write().await = batch.clone();
            match serde_json::to_value(batch.as_slice()) {
                Ok(value) => self.cache.set_with_ttl(SNAPSHOT_CACHE_KEY, value, self.cache_ttl),
                Err(e) => warn!("Failed to serialize snapshot for cache: {}", e),
            }
            report.published = true;
        } else {
            warn!(
                "All {} source(s) failed, keeping previous snapshot",
                self.fetchers.len()
            );
        }

        if let Some(store) = &self.store {
            if publish {
                store.upsert_items(&batch).await.inspect_err(|e| {
                    error!("Failed to persist {} item(s): {}", batch.len(), e);
                })?;
            }

            let days = self.retention_days();
            if days > 0 {
                let cutoff = Utc::now() - chrono::Duration::days(days);
                report.deleted = store.delete_items_older_than(cutoff).await.inspect_err(|e| {
                    error!("Retention sweep failed: {}", e);
                })?;
                if report.deleted > 0 {
                    info!(
                        "Retention sweep removed {} item(s) older than {} day(s)",
                        report.deleted, days
                    );
                }
            }
        }

        info!(
            "Refresh complete: {} item(s) from {}/{} source(s) in {:?}",
            report.items,
            report.succeeded,
            self.fetchers.len(),
            started.elapsed()
        );
        Ok(report)
    }

    /// Launch one task per fetcher; the receiver closes once all have finished.
    fn spawn_fetches(&self, ctx: &FetchContext) -> mpsc::Receiver<FetchOutcome> {
        let (tx, rx) = mpsc::channel(self.fetchers.len().max(1));
        let mut tasks = JoinSet::new();

        for fetcher in &self.fetchers {
            let fetcher = Arc::clone(fetcher);
            let ctx = ctx.clone();
            let tx = tx.clone();
            tasks.spawn(async move {
                let info = fetcher.source_info();
                let result = ctx.run(fetcher.fetch(&ctx)).await;
                // The receiver only goes away if refresh itself was dropped.
                let _ = tx.send((info, result)).await;
            });
        }

        tokio::spawn(async move {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    error!("Fetch task failed: {}", e);
                }
            }
            drop(tx);
        });

        rx
    }

    /// Answer a query. Never fails; degrades to the snapshot and the cache.
    pub async fn get_items(&self, params: &FilterParams) -> AggregatedResponse {
        let source_names = resolve_source_names(&params.sources, &self.sources);

        if let Some(store) = &self.store {
            match store.query_items(params, &source_names).await {
                Ok((items, total)) => return self.response(items, total),
                Err(e) => warn!("Store query failed, falling back to snapshot: {}", e),
            }
        }

        let snapshot = self.current_or_cached_snapshot().await;
        let (items, total) = filter::apply(&snapshot, params, &source_names);
        self.response(items, total)
    }

    async fn current_or_cached_snapshot(&self) -> Arc<Vec<FeedItem>> {
        let current = self.snapshot().await;
        if !current.is_empty() {
            return current;
        }

        let Some(value) = self.cache.get(SNAPSHOT_CACHE_KEY) else {
            return current;
        };
        let items: Vec<FeedItem> = match serde_json::from_value(value) {
            Ok(items) => items,
            Err(e) => {
                warn!("Discarding undecodable cached snapshot: {}", e);
                return current;
            }
        };
        if items.is_empty() {
            return current;
        }

        let mut guard = self.snapshot.write().await;
        if guard.is_empty() {
            debug!("Warmed snapshot from cache with {} item(s)", items.len());
            *guard = Arc::new(items);
        }
        guard.clone()
    }

    fn response(&self, items: Vec<FeedItem>, total_count: usize) -> AggregatedResponse {
        let fetched_at = items
            .iter()
            .map(|item| item.fetched_at)
            .max()
            .unwrap_or_else(Utc::now);
        AggregatedResponse {
            items,
            total_count,
            fetched_at,
            source_count: self.fetchers.len(),
        }
    }
}

/// Drop items whose id or normalized title was already seen.
///
/// The first occurrence wins and relative order is preserved.
pub fn dedup_items(items: Vec<FeedItem>) -> Vec<FeedItem> {
    let mut seen_ids = HashSet::new();
    let mut seen_titles = HashSet::new();
    items
        .into_iter()
        .filter(|item| {
            let new_id = !seen_ids.contains(&item.id);
            let title = normalize_title(&item.title);
            let new_title = !seen_titles.contains(&title);
            if new_id && new_title {
                seen_ids.insert(item.id.clone());
                seen_titles.insert(title);
                true
            } else {
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::cache::MemoryCache;
    use crate::feed::tagger::KeywordTagger;
    use crate::feed::types::SourceType;
    use crate::FlyfeedError;
    use async_trait::async_trait;
    use chrono::TimeZone;

    struct FixedFetcher {
        info: SourceInfo,
        items: Vec<FeedItem>,
    }

    #[async_trait]
    impl Fetcher for FixedFetcher {
        fn name(&self) -> &str {
            &self.info.name
        }

        fn source_info(&self) -> SourceInfo {
            self.info.clone()
        }

        async fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<FeedItem>> {
            if self.items.is_empty() {
                return Err(FlyfeedError::Http("HTTP 503".to_string()));
            }
            Ok(self.items.clone())
        }
    }

    fn item(source: &str, title: &str, day: u32) -> FeedItem {
        FeedItem::new(source, SourceType::Rss, title, format!("https://{source}/{title}"))
            .with_published_at(Utc.with_ymd_and_hms(2025, 3, day, 0, 0, 0).unwrap())
    }

    fn fetcher(name: &str, items: Vec<FeedItem>) -> Arc<dyn Fetcher> {
        Arc::new(FixedFetcher {
            info: SourceInfo::new(name, SourceType::Rss, format!("https://{name}/feed")),
            items,
        })
    }

    fn aggregator(fetchers: Vec<Arc<dyn Fetcher>>) -> Aggregator {
        Aggregator::new(
            fetchers,
            Arc::new(KeywordTagger::new()),
            Arc::new(MemoryCache::new()),
            &AggregatorConfig::default(),
        )
    }

    #[test]
    fn test_dedup_by_id_and_title() {
        let a = item("a", "Hello", 1);
        let a_again = a.clone().with_summary("different");
        let b_same_title = item("b", "  hello ", 2);
        let c = item("c", "Other", 3);

        let deduped = dedup_items(vec![a.clone(), a_again, b_same_title, c.clone()]);
        assert_eq!(deduped, vec![a, c]);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let items = vec![
            item("a", "One", 1),
            item("b", "one", 2),
            item("c", "Two", 3),
            item("a", "One", 1),
        ];
        let once = dedup_items(items);
        let twice = dedup_items(once.clone());
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn test_refresh_merges_inferred_tags() {
        let agg = aggregator(vec![fetcher(
            "news",
            vec![item("news", "New dji drone", 1).with_tags(["DJI", "Leaks"])],
        )]);
        let report = agg.refresh(&FetchContext::background()).await.unwrap();
        assert_eq!(report.items, 1);
        assert!(report.published);

        let snapshot = agg.snapshot().await;
        assert_eq!(snapshot[0].tags, vec!["DJI".to_string(), "Leaks".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_sorts_newest_first() {
        let agg = aggregator(vec![
            fetcher("a", vec![item("a", "old", 1), item("a", "newest", 9)]),
            fetcher("b", vec![item("b", "middle", 5)]),
        ]);
        agg.refresh(&FetchContext::background()).await.unwrap();
        let titles: Vec<String> = agg.snapshot().await.iter().map(|i| i.title.clone()).collect();
        assert_eq!(titles, vec!["newest", "middle", "old"]);
    }

    #[tokio::test]
    async fn test_total_failure_keeps_snapshot() {
        let agg = aggregator(vec![fetcher("a", vec![item("a", "keep me", 1)])]);
        agg.refresh(&FetchContext::background()).await.unwrap();

        let failing = Aggregator {
            fetchers: vec![fetcher("a", Vec::new())],
            ..agg
        };
        let report = failing.refresh(&FetchContext::background()).await.unwrap();
        assert_eq!(report.failed, 1);
        assert!(!report.published);
        assert_eq!(failing.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn test_total_failure_can_clear_snapshot() {
        let config = AggregatorConfig {
            keep_snapshot_on_total_failure: false,
            ..Default::default()
        };
        let agg = Aggregator::new(
            vec![fetcher("a", Vec::new())],
            Arc::new(KeywordTagger::new()),
            Arc::new(MemoryCache::new()),
            &config,
        );
        *agg.snapshot.write().await = Arc::new(vec![item("a", "stale", 1)]);

        let report = agg.refresh(&FetchContext::background()).await.unwrap();
        assert!(report.published);
        assert!(agg.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_with_huge_cache_ttl() {
        let config: AggregatorConfig =
            toml::from_str("cache_ttl_hours = 9223372036854775807").unwrap();
        let cache = Arc::new(MemoryCache::new());
        let agg = Aggregator::new(
            vec![fetcher("a", vec![item("a", "cached", 1)])],
            Arc::new(KeywordTagger::new()),
            cache.clone(),
            &config,
        );

        let report = agg.refresh(&FetchContext::background()).await.unwrap();
        assert!(report.published);
        assert!(cache.get(SNAPSHOT_CACHE_KEY).is_some());
    }

    #[tokio::test]
    async fn test_get_items_response_fields() {
        let agg = aggregator(vec![
            fetcher("a", vec![item("a", "one", 1)]),
            fetcher("b", Vec::new()),
        ]);
        let empty = agg.get_items(&FilterParams::new()).await;
        assert!(empty.items.is_empty());
        assert_eq!(empty.total_count, 0);
        assert_eq!(empty.source_count, 2);

        agg.refresh(&FetchContext::background()).await.unwrap();
        let response = agg.get_items(&FilterParams::new()).await;
        assert_eq!(response.total_count, 1);
        assert_eq!(response.fetched_at, response.items[0].fetched_at);
    }

    #[test]
    fn test_set_retention_days() {
        let agg = aggregator(Vec::new());
        assert_eq!(agg.retention_days(), 90);
        agg.set_retention_days(0);
        assert_eq!(agg.retention_days(), 0);
    }
}
