//! Feed types for flyfeed.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::FlyfeedError;

/// Number of hash bytes kept in an item id (rendered as 16 hex chars).
pub const ITEM_ID_BYTES: usize = 8;

/// Maximum summary length in characters.
pub const MAX_SUMMARY_LENGTH: usize = 500;

/// Protocol family of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// RSS / Atom syndication feed.
    Rss,
    /// Reddit-style JSON listing API.
    Reddit,
    /// Scraped HTML forum.
    Forum,
    /// Video channel feed.
    Youtube,
}

impl SourceType {
    /// Every source type.
    pub const ALL: [SourceType; 4] = [
        SourceType::Rss,
        SourceType::Reddit,
        SourceType::Forum,
        SourceType::Youtube,
    ];

    /// Stable lowercase name, as stored and matched in filters.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "rss",
            SourceType::Reddit => "reddit",
            SourceType::Forum => "forum",
            SourceType::Youtube => "youtube",
        }
    }

    /// Member of the `news` grouping.
    pub fn is_news(&self) -> bool {
        matches!(self, SourceType::Rss)
    }

    /// Member of the `community` grouping: community posts rather than syndicated news.
    pub fn is_community(&self) -> bool {
        matches!(self, SourceType::Reddit | SourceType::Forum)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = FlyfeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rss" => Ok(SourceType::Rss),
            "reddit" => Ok(SourceType::Reddit),
            "forum" => Ok(SourceType::Forum),
            "youtube" => Ok(SourceType::Youtube),
            other => Err(FlyfeedError::Validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

/// Vote and comment counters for sources that expose them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    /// Upvotes (or score).
    pub upvotes: i64,
    /// Number of comments.
    pub comments: i64,
}

impl Engagement {
    /// Combined score used by the `score` sort.
    pub fn score(&self) -> i64 {
        self.upvotes + self.comments
    }
}

/// One normalized unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    /// Hex id derived from `(source, url)`.
    pub id: String,
    /// Title.
    pub title: String,
    /// Canonical link.
    pub url: String,
    /// Display name of the source.
    pub source: String,
    /// Protocol family of the source.
    pub source_type: SourceType,
    /// Author name, empty if unknown.
    #[serde(default)]
    pub author: String,
    /// Plain-text summary.
    #[serde(default)]
    pub summary: String,
    /// Full body, if the source provides one.
    #[serde(default)]
    pub content: Option<String>,
    /// When the origin published the item.
    pub published_at: DateTime<Utc>,
    /// When the item was ingested.
    pub fetched_at: DateTime<Utc>,
    /// Thumbnail image URL.
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Tags, case-insensitively unique, first-seen casing kept.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Votes and comments.
    #[serde(default)]
    pub engagement: Option<Engagement>,
}

impl FeedItem {
    /// Create an item with the id derived from `source` and `url`.
    ///
    /// `published_at` and `fetched_at` are both set to now.
    pub fn new(
        source: impl Into<String>,
        source_type: SourceType,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        let source = source.into();
        let url = url.into();
        let now = Utc::now();
        Self {
            id: generate_item_id(&source, &url),
            title: title.into(),
            url,
            source,
            source_type,
            author: String::new(),
            summary: String::new(),
            content: None,
            published_at: now,
            fetched_at: now,
            thumbnail: None,
            tags: Vec::new(),
            engagement: None,
        }
    }

    /// Set the author.
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    /// Set the summary.
    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// Set the full content.
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Set the publication time.
    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = published_at;
        self
    }

    /// Set the ingestion time.
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = fetched_at;
        self
    }

    /// Set the thumbnail URL.
    pub fn with_thumbnail(mut self, thumbnail: impl Into<String>) -> Self {
        self.thumbnail = Some(thumbnail.into());
        self
    }

    /// Set the tags, dropping case-insensitive duplicates.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: Vec<String> = tags.into_iter().map(Into::into).collect();
        self.tags = merge_tags(&[], &tags);
        self
    }

    /// Set the engagement counters.
    pub fn with_engagement(mut self, upvotes: i64, comments: i64) -> Self {
        self.engagement = Some(Engagement { upvotes, comments });
        self
    }

    /// Upvotes plus comments, zero when the source has no counters.
    pub fn score(&self) -> i64 {
        self.engagement.map(|e| e.score()).unwrap_or(0)
    }
}

/// Static descriptor of a configured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Slug.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Feed or listing URL.
    pub url: String,
    /// Protocol family.
    pub source_type: SourceType,
    /// Free-form description.
    pub description: String,
    /// Format of the upstream document (e.g. "rss", "json", "html", "atom").
    pub feed_type: String,
    /// Whether the source is fetched.
    pub enabled: bool,
}

impl SourceInfo {
    /// Create an enabled source whose id is derived from `name`.
    pub fn new(name: impl Into<String>, source_type: SourceType, url: impl Into<String>) -> Self {
        let name = name.into();
        let feed_type = match source_type {
            SourceType::Rss => "rss",
            SourceType::Reddit => "json",
            SourceType::Forum => "html",
            SourceType::Youtube => "atom",
        };
        Self {
            id: slugify(&name),
            name,
            url: url.into(),
            source_type,
            description: String::new(),
            feed_type: feed_type.to_string(),
            enabled: true,
        }
    }

    /// Override the derived id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Sort order for queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest `published_at` first.
    #[default]
    Newest,
    /// Highest upvotes + comments first.
    Score,
}

impl SortOrder {
    /// Parse a query-string value. Anything but `score` means newest.
    pub fn parse(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("score") {
            SortOrder::Score
        } else {
            SortOrder::Newest
        }
    }
}

/// Query parameters for [`crate::feed::Aggregator::get_items`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    /// Page size; `<= 0` returns every filtered item.
    pub limit: i64,
    /// Number of filtered items to skip.
    pub offset: i64,
    /// Source ids to include (empty = all).
    pub sources: Vec<String>,
    /// Logical grouping (`news`, `community`) or an exact source type.
    pub source_type: String,
    /// Case-insensitive substring over title, summary, content and source name.
    pub query: String,
    /// Sort order.
    pub sort: SortOrder,
    /// Inclusive lower day bound on `published_at`.
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper day bound on `published_at`.
    pub to_date: Option<NaiveDate>,
    /// Case-insensitive exact tag match.
    pub tag: String,
}

impl FilterParams {
    /// Parameters that return everything, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set limit and offset.
    pub fn with_page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Restrict to the given source ids.
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Set the source type grouping.
    pub fn with_source_type(mut self, source_type: impl Into<String>) -> Self {
        self.source_type = source_type.into();
        self
    }

    /// Set the free-text query.
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Set the sort order.
    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Set the inclusive date range.
    pub fn with_dates(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.from_date = from;
        self.to_date = to;
        self
    }

    /// Set the tag filter.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = tag.into();
        self
    }
}

/// Response of a read query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// The requested page.
    pub items: Vec<FeedItem>,
    /// Number of items matching the filters, before pagination.
    pub total_count: usize,
    /// Latest `fetched_at` among the returned items, or now when empty.
    pub fetched_at: DateTime<Utc>,
    /// Number of configured sources.
    pub source_count: usize,
}

/// Derive a stable item id from the source name and canonical URL.
///
/// SHA-256 of `source|url`, truncated to [`ITEM_ID_BYTES`] and hex encoded.
pub fn generate_item_id(source: &str, url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update(b"|");
    hasher.update(url.as_bytes());
    hasher.finalize()[..ITEM_ID_BYTES]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Turn a display name into a source id: lowercase, spaces become hyphens.
pub fn slugify(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "-")
}

/// Title key used for cross-source dedup.
pub fn normalize_title(title: &str) -> String {
    title.trim().to_lowercase()
}

/// Union of two tag lists, case-insensitive, first-seen casing wins.
///
/// Order is `existing` followed by the new entries of `inferred`. Empty tags
/// are dropped.
pub fn merge_tags(existing: &[String], inferred: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + inferred.len());
    for tag in existing.iter().chain(inferred) {
        let tag = tag.trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            merged.push(tag.to_string());
        }
    }
    merged
}

/// Case-folded form of a tag, as compared by tag filters.
pub fn fold_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// Whether `tags` contains `target`, ignoring case.
pub fn contains_tag(tags: &[String], target: &str) -> bool {
    let target = fold_tag(target);
    if target.is_empty() {
        return false;
    }
    tags.iter().any(|t| fold_tag(t) == target)
}

/// Truncate to `max_chars` characters, appending an ellipsis when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max_chars).collect();
    truncated.push('…');
    truncated
}
