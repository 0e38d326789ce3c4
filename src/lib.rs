//! flyfeed - drone and FPV news aggregator
//!
//! Fetches syndication feeds, community listings, forums and video channels
//! concurrently, merges them into one deduplicated snapshot and serves
//! filtered queries over it.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod logging;
pub mod rate_limit;

pub use config::Config;
pub use db::{Database, DbPool};
pub use error::{FlyfeedError, Result};
pub use feed::{
    AggregatedResponse, Aggregator, Cache, FeedItem, FeedItemStore, FetchContext, Fetcher,
    FilterParams, KeywordTagger, MemoryCache, SortOrder, SourceInfo, SourceType,
    SqliteFeedItemStore, Tagger,
};
pub use rate_limit::HostRateLimiter;
