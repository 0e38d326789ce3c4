//! Test helpers for aggregator integration tests.
//!
//! Provides fake fetchers, item builders, aggregator constructors and log
//! capture.

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use flyfeed::config::AggregatorConfig;
use flyfeed::feed::{Cache, FeedItemStore, FetchContext, Fetcher, KeywordTagger, MemoryCache};
use flyfeed::{Aggregator, Database, FeedItem, FlyfeedError, Result, SourceInfo, SourceType};
use flyfeed::{FilterParams, SqliteFeedItemStore};

/// Fetcher returning a fixed list of items.
pub struct StaticFetcher {
    info: SourceInfo,
    items: Vec<FeedItem>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticFetcher {
    pub fn new(info: SourceInfo, items: Vec<FeedItem>) -> Self {
        Self {
            info,
            items,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Delay the response, to control completion order.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.items.clone())
    }
}

/// Fetcher that always fails.
pub struct FailingFetcher {
    info: SourceInfo,
}

impl FailingFetcher {
    pub fn new(info: SourceInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Fetcher for FailingFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        Err(FlyfeedError::Http(format!("HTTP 502 from {}", self.info.url)))
    }
}

/// Fetcher that never finishes and ignores its context.
pub struct HangingFetcher {
    info: SourceInfo,
}

impl HangingFetcher {
    pub fn new(info: SourceInfo) -> Self {
        Self { info }
    }
}

#[async_trait]
impl Fetcher for HangingFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, _ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        std::future::pending::<()>().await;
        Ok(Vec::new())
    }
}

/// Store whose every call fails.
pub struct BrokenStore;

#[async_trait]
impl FeedItemStore for BrokenStore {
    async fn upsert_items(&self, _items: &[FeedItem]) -> Result<()> {
        Err(FlyfeedError::Database("disk I/O error".to_string()))
    }

    async fn delete_items_older_than(&self, _cutoff: DateTime<Utc>) -> Result<u64> {
        Err(FlyfeedError::Database("disk I/O error".to_string()))
    }

    async fn query_items(
        &self,
        _params: &FilterParams,
        _source_names: &[String],
    ) -> Result<(Vec<FeedItem>, usize)> {
        Err(FlyfeedError::Database("disk I/O error".to_string()))
    }
}

pub fn rss_source(name: &str) -> SourceInfo {
    SourceInfo::new(name, SourceType::Rss, format!("https://{}/feed", slug(name)))
}

pub fn reddit_source(name: &str) -> SourceInfo {
    SourceInfo::new(name, SourceType::Reddit, "https://www.reddit.com/r/fpv/hot.json")
}

pub fn forum_source(name: &str) -> SourceInfo {
    SourceInfo::new(name, SourceType::Forum, "https://intofpv.com/f-news")
}

fn slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

/// Item from `source` published `hours_ago` hours ago.
pub fn item(source: &SourceInfo, title: &str, hours_ago: i64) -> FeedItem {
    FeedItem::new(
        &source.name,
        source.source_type,
        title,
        format!("{}/{}", source.url, slug(title)),
    )
    .with_published_at(Utc::now() - chrono::Duration::hours(hours_ago))
}

pub fn config() -> AggregatorConfig {
    AggregatorConfig::default()
}

/// Aggregator over `fetchers` with a memory cache and no store.
pub fn aggregator(fetchers: Vec<Arc<dyn Fetcher>>) -> Aggregator {
    aggregator_with_cache(fetchers, Arc::new(MemoryCache::new()))
}

pub fn aggregator_with_cache(fetchers: Vec<Arc<dyn Fetcher>>, cache: Arc<dyn Cache>) -> Aggregator {
    Aggregator::new(fetchers, Arc::new(KeywordTagger::new()), cache, &config())
}

/// In-memory SQLite store.
pub async fn sqlite_store() -> Arc<SqliteFeedItemStore> {
    let db = Database::open_in_memory().await.unwrap();
    Arc::new(SqliteFeedItemStore::new(db.pool().clone()))
}

/// In-memory sink for formatted log lines.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Capture log output on this thread until the guard is dropped.
///
/// Use with the default current-thread `#[tokio::test]` runtime so spawned
/// tasks log through the same subscriber.
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
