//! Video channel feed fetcher.
//!
//! Channel feeds are Atom documents. On top of the syndication parsing, the
//! thumbnail is derived from the video id found in the entry link, and the
//! media description (HTML stripped) is used as the summary.

use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use regex::Regex;
use tracing::debug;

use crate::feed::context::FetchContext;
use crate::feed::fetcher::{strip_html, Fetcher, HttpClient};
use crate::feed::rss::entry_link;
use crate::feed::types::{truncate_chars, FeedItem, SourceInfo, MAX_SUMMARY_LENGTH};
use crate::{FlyfeedError, Result};

/// Tag added to every video item.
const VIDEO_TAG: &str = "Video";

fn video_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:[?&]v=|youtu\.be/|/shorts/|/embed/|/live/)([A-Za-z0-9_-]{11})").ok()
    })
    .as_ref()
}

/// Extract the 11-character video id from a watch, short or embed link.
pub fn extract_video_id(link: &str) -> Option<String> {
    video_id_regex()?
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Thumbnail URL for a video id.
pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Fetcher for a video channel feed.
pub struct YoutubeFetcher {
    info: SourceInfo,
    http: HttpClient,
}

impl YoutubeFetcher {
    /// Create a fetcher for the channel feed at `info.url`.
    pub fn new(info: SourceInfo, http: HttpClient) -> Self {
        Self { info, http }
    }
}

#[async_trait]
impl Fetcher for YoutubeFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        let body = self.http.get_bytes(ctx, &self.info.url).await?;
        let items = parse_channel_items(
            &body,
            &self.info,
            self.http.config().max_items,
            Utc::now(),
        )?;
        debug!("Parsed {} video(s) from {}", items.len(), self.info.name);
        Ok(items)
    }
}

pub(crate) fn parse_channel_items(
    bytes: &[u8],
    info: &SourceInfo,
    max_items: usize,
    now: DateTime<Utc>,
) -> Result<Vec<FeedItem>> {
    let feed = parser::parse(bytes)
        .map_err(|e| FlyfeedError::Parse(format!("failed to parse channel feed: {}", e)))?;

    let mut items = Vec::new();
    for entry in feed.entries {
        if items.len() >= max_items {
            break;
        }
        let Some(url) = entry_link(&entry) else {
            continue;
        };

        let media = entry.media.first();
        let Some(title) = entry
            .title
            .as_ref()
            .or_else(|| media.and_then(|m| m.title.as_ref()))
            .map(|t| strip_html(&t.content))
            .filter(|t| !t.is_empty())
        else {
            continue;
        };
        let description = media
            .and_then(|m| m.description.as_ref())
            .or(entry.summary.as_ref())
            .map(|d| strip_html(&d.content))
            .unwrap_or_default();

        let thumbnail = extract_video_id(&url).map(|id| thumbnail_url(&id)).or_else(|| {
            media
                .and_then(|m| m.thumbnails.first())
                .map(|t| t.image.uri.clone())
        });

        let mut item = FeedItem::new(&info.name, info.source_type, title, url)
            .with_summary(truncate_chars(&description, MAX_SUMMARY_LENGTH))
            .with_published_at(entry.published.or(entry.updated).unwrap_or(now))
            .with_fetched_at(now)
            .with_tags([VIDEO_TAG]);
        if !description.is_empty() {
            item = item.with_content(description);
        }
        if let Some(author) = entry.authors.first() {
            item = item.with_author(author.name.trim());
        }
        if let Some(thumbnail) = thumbnail {
            item = item.with_thumbnail(thumbnail);
        }
        items.push(item);
    }
    Ok(items)
}
