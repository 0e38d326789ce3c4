//! Feed aggregation for flyfeed.
//!
//! This module provides:
//! - Fetchers for syndication feeds, community listings, forums and video channels
//! - The aggregator (refresh and query paths)
//! - Tagging, caching and persistence collaborators
//! - A background updater

pub mod aggregator;
pub mod cache;
pub mod context;
pub mod fetcher;
pub mod filter;
pub mod forum;
pub mod reddit;
pub mod registry;
pub mod rss;
pub mod store;
pub mod tagger;
pub mod types;
pub mod updater;
pub mod youtube;

pub use aggregator::{dedup_items, Aggregator, RefreshReport, SNAPSHOT_CACHE_KEY};
pub use cache::{Cache, MemoryCache};
pub use context::{CancelHandle, FetchContext};
pub use fetcher::{Fetcher, FetcherConfig, HttpClient};
pub use forum::ForumFetcher;
pub use reddit::RedditFetcher;
pub use registry::{build_fetcher, build_fetchers, source_info};
pub use rss::RssFetcher;
pub use store::{FeedItemStore, SqliteFeedItemStore};
pub use tagger::{KeywordTagger, Tagger};
pub use types::{
    contains_tag, generate_item_id, merge_tags, normalize_title, slugify, AggregatedResponse,
    Engagement, FeedItem, FilterParams, SortOrder, SourceInfo, SourceType,
};
pub use updater::{start_feed_updater, FeedUpdater};
pub use youtube::YoutubeFetcher;
