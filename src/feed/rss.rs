//! RSS / Atom syndication fetcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use tracing::debug;

use crate::feed::context::FetchContext;
use crate::feed::fetcher::{strip_html, Fetcher, HttpClient};
use crate::feed::types::{truncate_chars, FeedItem, SourceInfo, MAX_SUMMARY_LENGTH};
use crate::{FlyfeedError, Result};

/// Fetcher for a syndication feed.
pub struct RssFetcher {
    info: SourceInfo,
    http: HttpClient,
}

impl RssFetcher {
    /// Create a fetcher for the feed at `info.url`.
    pub fn new(info: SourceInfo, http: HttpClient) -> Self {
        Self { info, http }
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        let body = self.http.get_bytes(ctx, &self.info.url).await?;
        let items = parse_feed_items(
            &body,
            &self.info,
            self.http.config().max_items,
            Utc::now(),
        )?;
        debug!("Parsed {} item(s) from {}", items.len(), self.info.name);
        Ok(items)
    }
}

/// Parse a syndication document into feed items.
///
/// Entries without a link or a title are skipped. Missing publication dates
/// fall back to `now`; categories become tags.
pub(crate) fn parse_feed_items(
    bytes: &[u8],
    info: &SourceInfo,
    max_items: usize,
    now: DateTime<Utc>,
) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)
        .map_err(|e| FlyfeedError::Parse(format!("failed to parse feed: {}", e)))?;

    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_item(entry, info, now))
        .take(max_items)
        .collect();
    Ok(items)
}

fn entry_to_item(entry: Entry, info: &SourceInfo, now: DateTime<Utc>) -> Option<FeedItem> {
    let url = entry_link(&entry)?;
    let title = entry
        .title
        .as_ref()
        .map(|t| strip_html(&t.content))
        .filter(|t| !t.is_empty())?;

    let content = entry.content.as_ref().and_then(|c| c.body.clone());
    let summary = entry
        .summary
        .as_ref()
        .map(|s| s.content.clone())
        .or_else(|| content.clone())
        .map(|s| truncate_chars(&strip_html(&s), MAX_SUMMARY_LENGTH))
        .unwrap_or_default();

    let tags: Vec<String> = entry
        .categories
        .iter()
        .map(|c| c.label.clone().unwrap_or_else(|| c.term.clone()))
        .collect();

    let thumbnail = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();

    let mut item = FeedItem::new(&info.name, info.source_type, title, url)
        .with_summary(summary)
        .with_published_at(entry.published.or(entry.updated).unwrap_or(now))
        .with_fetched_at(now)
        .with_tags(tags);
    if let Some(author) = entry.authors.first() {
        item = item.with_author(author.name.trim());
    }
    if let Some(content) = content {
        item = item.with_content(content);
    }
    if let Some(thumbnail) = thumbnail {
        item = item.with_thumbnail(thumbnail);
    }
    Some(item)
}

/// Preferred link of an entry: `alternate` first, then the first link.
pub(crate) fn entry_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|l| l.rel.as_deref() == Some("alternate"))
        .or_else(|| entry.links.first())
        .map(|l| l.href.trim().to_string())
        .filter(|href| !href.is_empty())
}
