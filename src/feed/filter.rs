//! Filtering, sorting and pagination of feed items.
//!
//! The same semantics are implemented in SQL by the item store; the two must
//! stay in step.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};

use crate::feed::types::{contains_tag, FeedItem, FilterParams, SortOrder, SourceInfo, SourceType};

/// Parsed form of [`FilterParams::source_type`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceTypeFilter {
    /// No restriction.
    Any,
    /// Syndication feeds.
    News,
    /// Community posts (API listings and scraped forums).
    Community,
    /// Item type name must equal this lowercase value.
    Exact(String),
}

impl SourceTypeFilter {
    /// Interpret a grouping (`news`, `community`) or a raw source type name.
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "" => SourceTypeFilter::Any,
            "news" => SourceTypeFilter::News,
            "community" => SourceTypeFilter::Community,
            _ => SourceTypeFilter::Exact(value),
        }
    }

    /// Whether an item of `source_type` passes.
    pub fn matches(&self, source_type: SourceType) -> bool {
        match self {
            SourceTypeFilter::Any => true,
            SourceTypeFilter::News => source_type.is_news(),
            SourceTypeFilter::Community => source_type.is_community(),
            SourceTypeFilter::Exact(name) => source_type.as_str() == name,
        }
    }

    /// The source types that pass, or `None` when nothing is filtered.
    pub fn allowed_types(&self) -> Option<Vec<SourceType>> {
        match self {
            SourceTypeFilter::Any => None,
            _ => Some(
                SourceType::ALL
                    .into_iter()
                    .filter(|ty| self.matches(*ty))
                    .collect(),
            ),
        }
    }
}

/// Translate source ids to display names. Unknown ids map to themselves.
pub fn resolve_source_names(ids: &[String], sources: &[SourceInfo]) -> Vec<String> {
    let by_id: HashMap<&str, &str> = sources
        .iter()
        .map(|s| (s.id.as_str(), s.name.as_str()))
        .collect();
    ids.iter()
        .map(|id| {
            let id = id.trim();
            by_id.get(id).copied().unwrap_or(id).to_string()
        })
        .collect()
}

/// Start of `from` (inclusive) and start of the day after `to` (exclusive).
pub fn date_bounds(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let lower = from.map(|d| d.and_time(NaiveTime::MIN).and_utc());
    let upper = to
        .and_then(|d| d.checked_add_days(Days::new(1)))
        .map(|d| d.and_time(NaiveTime::MIN).and_utc());
    (lower, upper)
}

/// Compiled filter over in-memory items.
#[derive(Debug)]
pub struct ItemFilter {
    sources: HashSet<String>,
    source_type: SourceTypeFilter,
    query: String,
    tag: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

impl ItemFilter {
    /// Build a filter from query parameters and the resolved source names.
    pub fn new(params: &FilterParams, source_names: &[String]) -> Self {
        let (from, to) = date_bounds(params.from_date, params.to_date);
        Self {
            sources: source_names.iter().cloned().collect(),
            source_type: SourceTypeFilter::parse(&params.source_type),
            query: params.query.trim().to_lowercase(),
            tag: params.tag.trim().to_string(),
            from,
            to,
        }
    }

    /// Whether `item` passes every filter.
    pub fn matches(&self, item: &FeedItem) -> bool {
        if !self.sources.is_empty() && !self.sources.contains(&item.source) {
            return false;
        }
        if !self.source_type.matches(item.source_type) {
            return false;
        }
        if !self.tag.is_empty() && !contains_tag(&item.tags, &self.tag) {
            return false;
        }
        if !self.query.is_empty() && !self.matches_query(item) {
            return false;
        }
        if self.from.is_some_and(|from| item.published_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| item.published_at >= to) {
            return false;
        }
        true
    }

    fn matches_query(&self, item: &FeedItem) -> bool {
        searchable_fields(item)
            .iter()
            .any(|field| field.to_lowercase().contains(&self.query))
    }
}

/// Fields matched by the free-text query.
pub fn searchable_fields(item: &FeedItem) -> [&str; 4] {
    [
        item.title.as_str(),
        item.summary.as_str(),
        item.content.as_deref().unwrap_or_default(),
        item.source.as_str(),
    ]
}

/// Total order for `sort`: key descending, then newest first, then id ascending.
///
/// Timestamps compare at microsecond precision, the precision the item store
/// keeps, so both read tiers order ties identically.
pub fn compare_items(a: &FeedItem, b: &FeedItem, sort: SortOrder) -> Ordering {
    let newest = || {
        b.published_at
            .timestamp_micros()
            .cmp(&a.published_at.timestamp_micros())
    };
    let by_key = match sort {
        SortOrder::Score => b.score().cmp(&a.score()).then_with(newest),
        SortOrder::Newest => newest(),
    };
    by_key.then_with(|| a.id.cmp(&b.id))
}

/// Sort in place with [`compare_items`].
pub fn sort_items(items: &mut [FeedItem], sort: SortOrder) {
    items.sort_by(|a, b| compare_items(a, b, sort));
}

/// One page of `items`.
///
/// `limit <= 0` returns everything and ignores the offset. A negative offset
/// counts as zero.
pub fn paginate(items: Vec<FeedItem>, limit: i64, offset: i64) -> Vec<FeedItem> {
    if limit <= 0 {
        return items;
    }
    let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    items.into_iter().skip(offset).take(limit).collect()
}

/// Filter, sort and paginate; returns the page and the filtered count.
pub fn apply(
    items: &[FeedItem],
    params: &FilterParams,
    source_names: &[String],
) -> (Vec<FeedItem>, usize) {
    let filter = ItemFilter::new(params, source_names);
    let mut matched: Vec<FeedItem> = items
        .iter()
        .filter(|item| filter.matches(item))
        .cloned()
        .collect();
    let total = matched.len();
    sort_items(&mut matched, params.sort);
    (paginate(matched, params.limit, params.offset), total)
}
