//! Reddit-style JSON listing fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::feed::context::FetchContext;
use crate::feed::fetcher::{strip_html, Fetcher, HttpClient};
use crate::feed::types::{truncate_chars, FeedItem, SourceInfo};
use crate::{FlyfeedError, Result};

/// Base URL permalinks are resolved against.
const REDDIT_BASE_URL: &str = "https://www.reddit.com";

/// Summary length for self posts, in characters.
const REDDIT_SUMMARY_LENGTH: usize = 300;

/// Thumbnail values that are placeholders rather than image URLs.
const THUMBNAIL_SENTINELS: &[&str] = &["self", "default", "nsfw", "spoiler", "image", ""];

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<Child>,
}

#[derive(Debug, Deserialize)]
struct Child {
    data: Post,
}

#[derive(Debug, Deserialize)]
struct Post {
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    thumbnail: Option<String>,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    link_flair_text: Option<String>,
    #[serde(default)]
    stickied: bool,
}

/// Fetcher for a subreddit listing (`.../hot.json`).
pub struct RedditFetcher {
    info: SourceInfo,
    http: HttpClient,
}

impl RedditFetcher {
    /// Create a fetcher for the listing at `info.url`.
    pub fn new(info: SourceInfo, http: HttpClient) -> Self {
        Self { info, http }
    }

    fn listing_url(&self) -> String {
        let limit = self.http.config().max_items;
        if self.info.url.contains("limit=") {
            self.info.url.clone()
        } else if self.info.url.contains('?') {
            format!("{}&limit={}", self.info.url, limit)
        } else {
            format!("{}?limit={}", self.info.url, limit)
        }
    }
}

#[async_trait]
impl Fetcher for RedditFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        let body = self.http.get_bytes(ctx, &self.listing_url()).await?;
        let items = parse_listing(
            &body,
            &self.info,
            self.http.config().max_items,
            Utc::now(),
        )?;
        debug!("Parsed {} post(s) from {}", items.len(), self.info.name);
        Ok(items)
    }
}

/// Parse a listing document. Stickied posts are skipped.
pub(crate) fn parse_listing(
    bytes: &[u8],
    info: &SourceInfo,
    max_items: usize,
    now: DateTime<Utc>,
) -> Result<Vec<FeedItem>> {
    let listing: Listing = serde_json::from_slice(bytes)
        .map_err(|e| FlyfeedError::Parse(format!("failed to parse listing: {}", e)))?;

    let items = listing
        .data
        .children
        .into_iter()
        .map(|child| child.data)
        .filter(|post| !post.stickied && !post.title.trim().is_empty())
        .take(max_items)
        .map(|post| post_to_item(post, info, now))
        .collect();
    Ok(items)
}

fn post_to_item(post: Post, info: &SourceInfo, now: DateTime<Utc>) -> FeedItem {
    let url = if post.permalink.is_empty() {
        post.url.clone()
    } else {
        format!("{}{}", REDDIT_BASE_URL, post.permalink)
    };
    let published_at = DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or(now);
    let selftext = strip_html(&post.selftext);

    let mut item = FeedItem::new(&info.name, info.source_type, post.title.trim(), url)
        .with_author(post.author)
        .with_summary(truncate_chars(&selftext, REDDIT_SUMMARY_LENGTH))
        .with_published_at(published_at)
        .with_fetched_at(now)
        .with_engagement(post.ups, post.num_comments);
    if !selftext.is_empty() {
        item = item.with_content(selftext);
    }
    if let Some(flair) = post.link_flair_text.filter(|f| !f.trim().is_empty()) {
        item = item.with_tags([flair]);
    }
    if let Some(thumbnail) = post.thumbnail.filter(|t| is_real_thumbnail(t)) {
        item = item.with_thumbnail(thumbnail);
    }
    item
}

fn is_real_thumbnail(value: &str) -> bool {
    let value = value.trim();
    !THUMBNAIL_SENTINELS.contains(&value) && value.starts_with("http")
}
