//! Persistent feed item store.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::debug;

use crate::db::DbPool;
use crate::feed::filter::{date_bounds, searchable_fields, SourceTypeFilter};
use crate::feed::types::{fold_tag, Engagement, FeedItem, FilterParams, SortOrder};
use crate::{FlyfeedError, Result};

/// Durable history of feed items.
#[async_trait]
pub trait FeedItemStore: Send + Sync {
    /// Insert or replace items by id.
    async fn upsert_items(&self, items: &[FeedItem]) -> Result<()>;

    /// Delete items fetched before `cutoff`; returns the number deleted.
    async fn delete_items_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Filtered, sorted page of items plus the filtered count.
    ///
    /// `source_names` are display names already resolved from the requested
    /// source ids; empty means no source restriction.
    async fn query_items(
        &self,
        params: &FilterParams,
        source_names: &[String],
    ) -> Result<(Vec<FeedItem>, usize)>;
}

const ITEM_COLUMNS: &str = "id, title, url, source, source_type, author, summary, content, \
     published_at, fetched_at, thumbnail, tags, upvotes, comments";

// `search_text` and `tags_folded` hold JSON arrays case-folded in Rust.
// SQLite's lower() and LIKE only fold ASCII.
const UPSERT_ITEM: &str = r#"
    INSERT INTO feed_items (
        id, title, url, source, source_type, author, summary, content,
        published_at, fetched_at, thumbnail, tags, upvotes, comments,
        search_text, tags_folded
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        url = excluded.url,
        source = excluded.source,
        source_type = excluded.source_type,
        author = excluded.author,
        summary = excluded.summary,
        content = excluded.content,
        published_at = excluded.published_at,
        fetched_at = excluded.fetched_at,
        thumbnail = excluded.thumbnail,
        tags = excluded.tags,
        upvotes = excluded.upvotes,
        comments = excluded.comments,
        search_text = excluded.search_text,
        tags_folded = excluded.tags_folded
"#;

/// Row type for a feed item from database.
#[derive(Debug, Clone, sqlx::FromRow)]
struct FeedItemRow {
    id: String,
    title: String,
    url: String,
    source: String,
    source_type: String,
    author: String,
    summary: String,
    content: Option<String>,
    published_at: String,
    fetched_at: String,
    thumbnail: Option<String>,
    tags: String,
    upvotes: Option<i64>,
    comments: Option<i64>,
}

impl TryFrom<FeedItemRow> for FeedItem {
    type Error = FlyfeedError;

    fn try_from(row: FeedItemRow) -> Result<Self> {
        let engagement = match (row.upvotes, row.comments) {
            (None, None) => None,
            (upvotes, comments) => Some(Engagement {
                upvotes: upvotes.unwrap_or(0),
                comments: comments.unwrap_or(0),
            }),
        };
        Ok(FeedItem {
            source_type: row.source_type.parse()?,
            id: row.id,
            title: row.title,
            url: row.url,
            source: row.source,
            author: row.author,
            summary: row.summary,
            content: row.content,
            published_at: parse_datetime(&row.published_at).unwrap_or_else(Utc::now),
            fetched_at: parse_datetime(&row.fetched_at).unwrap_or_else(Utc::now),
            thumbnail: row.thumbnail,
            tags: serde_json::from_str(&row.tags).unwrap_or_default(),
            engagement,
        })
    }
}

/// SQLite-backed [`FeedItemStore`].
#[derive(Debug, Clone)]
pub struct SqliteFeedItemStore {
    pool: DbPool,
}

impl SqliteFeedItemStore {
    /// Create a store over an open pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Total number of stored items.
    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM feed_items")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))
    }

    /// Look up one item by id.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<FeedItem>> {
        let row = sqlx::query_as::<_, FeedItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM feed_items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| FlyfeedError::Database(e.to_string()))?;
        row.map(FeedItem::try_from).transpose()
    }
}

#[async_trait]
impl FeedItemStore for SqliteFeedItemStore {
    async fn upsert_items(&self, items: &[FeedItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))?;

        for item in items {
            let tags = serde_json::to_string(&item.tags)?;
            let search_text =
                serde_json::to_string(&searchable_fields(item).map(str::to_lowercase))?;
            let tags_folded = serde_json::to_string(
                &item.tags.iter().map(|t| fold_tag(t)).collect::<Vec<_>>(),
            )?;
            sqlx::query(UPSERT_ITEM)
                .bind(&item.id)
                .bind(&item.title)
                .bind(&item.url)
                .bind(&item.source)
                .bind(item.source_type.as_str())
                .bind(&item.author)
                .bind(&item.summary)
                .bind(&item.content)
                .bind(format_datetime(&item.published_at))
                .bind(format_datetime(&item.fetched_at))
                .bind(&item.thumbnail)
                .bind(tags)
                .bind(item.engagement.map(|e| e.upvotes))
                .bind(item.engagement.map(|e| e.comments))
                .bind(search_text)
                .bind(tags_folded)
                .execute(&mut *tx)
                .await
                .map_err(|e| FlyfeedError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))?;
        debug!("Upserted {} item(s)", items.len());
        Ok(())
    }

    async fn delete_items_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM feed_items WHERE fetched_at < ?")
            .bind(format_datetime(&cutoff))
            .execute(&self.pool)
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    async fn query_items(
        &self,
        params: &FilterParams,
        source_names: &[String],
    ) -> Result<(Vec<FeedItem>, usize)> {
        let mut count_query: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) FROM feed_items WHERE 1 = 1");
        push_filters(&mut count_query, params, source_names);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM feed_items WHERE 1 = 1"));
        push_filters(&mut query, params, source_names);
        match params.sort {
            SortOrder::Score => query.push(
                " ORDER BY (COALESCE(upvotes, 0) + COALESCE(comments, 0)) DESC, \
                 published_at DESC, id ASC",
            ),
            SortOrder::Newest => query.push(" ORDER BY published_at DESC, id ASC"),
        };
        if params.limit > 0 {
            query.push(" LIMIT ");
            query.push_bind(params.limit);
            query.push(" OFFSET ");
            query.push_bind(params.offset.max(0));
        }

        let rows = query
            .build_query_as::<FeedItemRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| FlyfeedError::Database(e.to_string()))?;
        let items = rows
            .into_iter()
            .map(FeedItem::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((items, usize::try_from(total).unwrap_or(0)))
    }
}

/// Append the `AND ...` clauses shared by the count and page queries.
fn push_filters(
    query: &mut QueryBuilder<'_, Sqlite>,
    params: &FilterParams,
    source_names: &[String],
) {
    if !source_names.is_empty() {
        query.push(" AND source IN (");
        let mut separated = query.separated(", ");
        for name in source_names {
            separated.push_bind(name.clone());
        }
        separated.push_unseparated(")");
    }

    match SourceTypeFilter::parse(&params.source_type).allowed_types() {
        None => {}
        Some(types) if types.is_empty() => {
            query.push(" AND 0");
        }
        Some(types) => {
            query.push(" AND source_type IN (");
            let mut separated = query.separated(", ");
            for ty in types {
                separated.push_bind(ty.as_str());
            }
            separated.push_unseparated(")");
        }
    }

    let tag = fold_tag(&params.tag);
    if !tag.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM json_each(feed_items.tags_folded) WHERE json_each.value = ",
        );
        query.push_bind(tag);
        query.push(")");
    }

    let text = params.query.trim().to_lowercase();
    if !text.is_empty() {
        query.push(
            " AND EXISTS (SELECT 1 FROM json_each(feed_items.search_text) WHERE json_each.value LIKE ",
        );
        query.push_bind(format!("%{}%", escape_like(&text)));
        query.push(" ESCAPE '\\')");
    }

    let (from, to) = date_bounds(params.from_date, params.to_date);
    if let Some(from) = from {
        query.push(" AND published_at >= ");
        query.push_bind(format_datetime(&from));
    }
    if let Some(to) = to {
        query.push(" AND published_at < ");
        query.push_bind(format_datetime(&to));
    }
}

fn escape_like(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for ch in s.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Fixed-width UTC timestamp so that string order equals time order.
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // Try RFC3339 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Try SQLite datetime format
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::feed::types::SourceType;
    use chrono::{Duration, NaiveDate, TimeZone};

    async fn setup_store() -> SqliteFeedItemStore {
        let db = Database::open_in_memory().await.unwrap();
        SqliteFeedItemStore::new(db.pool().clone())
    }

    fn item(source: &str, ty: SourceType, title: &str, day: u32) -> FeedItem {
        let published = Utc.with_ymd_and_hms(2025, 3, day, 12, 0, 0).unwrap();
        FeedItem::new(source, ty, title, format!("https://example.com/{source}/{title}"))
            .with_published_at(published)
            .with_fetched_at(published)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = setup_store().await;
        let original = item("DroneDJ", SourceType::Rss, "DJI Mini 5", 1)
            .with_summary("Leaks")
            .with_tags(["DJI", "Leaks"])
            .with_thumbnail("https://img/1.jpg");
        store.upsert_items(&[original.clone()]).await.unwrap();

        let loaded = store.get_by_id(&original.id).await.unwrap().unwrap();
        assert_eq!(loaded, original);
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent_by_id() {
        let store = setup_store().await;
        let first = item("r/fpv", SourceType::Reddit, "Build log", 2).with_engagement(1, 0);
        store.upsert_items(&[first.clone()]).await.unwrap();

        let updated = first.clone().with_engagement(40, 12);
        store.upsert_items(&[updated.clone()]).await.unwrap();
        store.upsert_items(&[updated.clone()]).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        let loaded = store.get_by_id(&first.id).await.unwrap().unwrap();
        assert_eq!(loaded.engagement, updated.engagement);
    }

    #[tokio::test]
    async fn test_upsert_empty_is_noop() {
        let store = setup_store().await;
        store.upsert_items(&[]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_items_older_than() {
        let store = setup_store().await;
        let now = Utc::now();
        let old = item("s", SourceType::Rss, "old", 1).with_fetched_at(now - Duration::days(91));
        let recent = item("s", SourceType::Rss, "recent", 2).with_fetched_at(now - Duration::days(89));
        store.upsert_items(&[old.clone(), recent.clone()]).await.unwrap();

        let deleted = store
            .delete_items_older_than(now - Duration::days(90))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_by_id(&old.id).await.unwrap().is_none());
        assert!(store.get_by_id(&recent.id).await.unwrap().is_some());
    }

    async fn seeded_store() -> SqliteFeedItemStore {
        let store = setup_store().await;
        store
            .upsert_items(&[
                item("DroneDJ", SourceType::Rss, "DJI Neo review", 1).with_tags(["DJI"]),
                item("Oscar Liang", SourceType::Rss, "100% throttle_test", 2),
                item("r/fpv", SourceType::Reddit, "First crash", 3).with_engagement(10, 4),
                item("IntoFPV", SourceType::Forum, "Motor help", 4)
                    .with_content("my dji motors")
                    .with_tags(["Help"]),
                item("Bardwell", SourceType::Youtube, "Filters", 5),
            ])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_query_newest_and_pagination() {
        let store = seeded_store().await;
        let (items, total) = store.query_items(&FilterParams::new(), &[]).await.unwrap();
        assert_eq!(total, 5);
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(
            titles,
            vec!["Filters", "Motor help", "First crash", "100% throttle_test", "DJI Neo review"]
        );

        let (page, total) = store
            .query_items(&FilterParams::new().with_page(2, 4), &[])
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert_eq!(page.len(), 1);

        let (page, total) = store
            .query_items(&FilterParams::new().with_page(2, 10), &[])
            .await
            .unwrap();
        assert_eq!(total, 5);
        assert!(page.is_empty());
    }

    #[tokio::test]
    async fn test_query_source_type_grouping() {
        let store = seeded_store().await;
        let (items, total) = store
            .query_items(&FilterParams::new().with_source_type("community"), &[])
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert!(items.iter().all(|i| i.source_type.is_community()));

        let (_, total) = store
            .query_items(&FilterParams::new().with_source_type("news"), &[])
            .await
            .unwrap();
        assert_eq!(total, 2);

        let (items, _) = store
            .query_items(&FilterParams::new().with_source_type("YOUTUBE"), &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Filters");
    }

    #[tokio::test]
    async fn test_query_text_tag_and_sources() {
        let store = seeded_store().await;

        let (items, _) = store
            .query_items(&FilterParams::new().with_query("DJI"), &[])
            .await
            .unwrap();
        let titles: Vec<&str> = items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["Motor help", "DJI Neo review"]);

        // LIKE wildcards in the query are literal.
        let (items, _) = store
            .query_items(&FilterParams::new().with_query("0% t"), &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        let (items, _) = store
            .query_items(&FilterParams::new().with_query("e_t"), &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let (items, _) = store
            .query_items(&FilterParams::new().with_tag("dji"), &[])
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        let names = vec!["r/fpv".to_string(), "IntoFPV".to_string()];
        let (_, total) = store.query_items(&FilterParams::new(), &names).await.unwrap();
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_query_folds_non_ascii_case() {
        let store = setup_store().await;
        store
            .upsert_items(&[
                item("Дрон Ревю", SourceType::Rss, "ÉCRAN DJI обзор", 1).with_tags(["Дрон"]),
                item("DroneDJ", SourceType::Rss, "Motor review", 2),
            ])
            .await
            .unwrap();

        for query in ["écran", "ОБЗОР", "дрон ревю"] {
            let (items, total) = store
                .query_items(&FilterParams::new().with_query(query), &[])
                .await
                .unwrap();
            assert_eq!(total, 1, "query {query}");
            assert_eq!(items[0].title, "ÉCRAN DJI обзор");
        }

        let (_, total) = store
            .query_items(&FilterParams::new().with_tag("дРОН"), &[])
            .await
            .unwrap();
        assert_eq!(total, 1);
    }

    #[tokio::test]
    async fn test_query_sort_by_score_and_dates() {
        let store = seeded_store().await;
        let (items, _) = store
            .query_items(&FilterParams::new().with_sort(SortOrder::Score), &[])
            .await
            .unwrap();
        assert_eq!(items[0].title, "First crash");

        let params = FilterParams::new().with_dates(
            NaiveDate::from_ymd_opt(2025, 3, 2),
            NaiveDate::from_ymd_opt(2025, 3, 3),
        );
        let (items, total) = store.query_items(&params, &[]).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(items[0].title, "First crash");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("100%_a\\b"), "100\\%\\_a\\\\b");
    }

    #[test]
    fn test_format_datetime_is_sortable() {
        let a = format_datetime(&Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap());
        let b = format_datetime(&Utc.with_ymd_and_hms(2025, 1, 10, 0, 0, 0).unwrap());
        assert_eq!(a, "2025-01-02T03:04:05.000000Z");
        assert!(a < b);
        assert_eq!(parse_datetime(&a), Some(Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap()));
    }
}
