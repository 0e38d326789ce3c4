//! HTML forum scraper.
//!
//! Forums have no feed, so threads are extracted from listing pages with the
//! CSS selectors configured for the source. When a `next_page` selector is
//! set, up to `max_pages` pages are followed.

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::config::ForumSelectors;
use crate::feed::context::FetchContext;
use crate::feed::fetcher::{parse_loose_date, strip_html, Fetcher, HttpClient};
use crate::feed::types::{truncate_chars, FeedItem, SourceInfo, MAX_SUMMARY_LENGTH};
use crate::{FlyfeedError, Result};

/// Compiled selectors for one forum.
#[derive(Debug)]
struct CompiledSelectors {
    container: Selector,
    title: Selector,
    link: Option<Selector>,
    author: Option<Selector>,
    date: Option<Selector>,
    summary: Option<Selector>,
    next_page: Option<Selector>,
}

impl CompiledSelectors {
    fn compile(selectors: &ForumSelectors) -> Result<Self> {
        Ok(Self {
            container: compile(&selectors.container)?,
            title: compile(&selectors.title)?,
            link: selectors.link.as_deref().map(compile).transpose()?,
            author: selectors.author.as_deref().map(compile).transpose()?,
            date: selectors.date.as_deref().map(compile).transpose()?,
            summary: selectors.summary.as_deref().map(compile).transpose()?,
            next_page: selectors.next_page.as_deref().map(compile).transpose()?,
        })
    }
}

fn compile(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| FlyfeedError::Config(format!("invalid selector '{}': {}", selector, e)))
}

/// One parsed listing page.
#[derive(Debug, Default)]
pub(crate) struct ForumPage {
    pub items: Vec<FeedItem>,
    pub next_page: Option<String>,
}

/// Fetcher for a scraped forum listing.
pub struct ForumFetcher {
    info: SourceInfo,
    http: HttpClient,
    selectors: CompiledSelectors,
    max_pages: usize,
}

impl ForumFetcher {
    /// Create a fetcher. Fails if any selector does not compile.
    pub fn new(
        info: SourceInfo,
        http: HttpClient,
        selectors: &ForumSelectors,
        max_pages: usize,
    ) -> Result<Self> {
        Ok(Self {
            info,
            http,
            selectors: CompiledSelectors::compile(selectors)?,
            max_pages: max_pages.max(1),
        })
    }

    /// Follow listing pages from the source URL, loading each with `load_page`.
    ///
    /// Any page failure fails the whole fetch.
    async fn scrape_pages<F, Fut>(&self, mut load_page: F) -> Result<Vec<FeedItem>>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<Vec<u8>>>,
    {
        let max_items = self.http.config().max_items;
        let mut items: Vec<FeedItem> = Vec::new();
        let mut page_url = self.info.url.clone();

        for page in 0..self.max_pages {
            let body = load_page(page_url.clone()).await?;
            let html = String::from_utf8_lossy(&body);
            let parsed = parse_forum_page(
                &html,
                &page_url,
                &self.selectors,
                &self.info,
                max_items.saturating_sub(items.len()),
                Utc::now(),
            )?;

            for item in parsed.items {
                if !items.iter().any(|existing| existing.id == item.id) {
                    items.push(item);
                }
            }
            debug!(
                "Scraped page {} of {}: {} thread(s) so far",
                page + 1,
                self.info.name,
                items.len()
            );

            match parsed.next_page {
                Some(next) if items.len() < max_items && next != page_url => page_url = next,
                _ => break,
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl Fetcher for ForumFetcher {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn source_info(&self) -> SourceInfo {
        self.info.clone()
    }

    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<FeedItem>> {
        self.scrape_pages(|url| async move { self.http.get_bytes(ctx, &url).await })
            .await
    }
}

/// Extract threads from one listing page.
///
/// Containers without a title are skipped. Relative links are resolved
/// against `page_url`; dates that cannot be parsed fall back to `now`.
fn parse_forum_page(
    html: &str,
    page_url: &str,
    selectors: &CompiledSelectors,
    info: &SourceInfo,
    max_items: usize,
    now: DateTime<Utc>,
) -> Result<ForumPage> {
    let base = Url::parse(page_url)
        .map_err(|e| FlyfeedError::Parse(format!("invalid page URL {}: {}", page_url, e)))?;
    let document = Html::parse_document(html);

    let mut items = Vec::new();
    for container in document.select(&selectors.container) {
        if items.len() >= max_items {
            break;
        }
        let Some(title_el) = container.select(&selectors.title).next() else {
            continue;
        };
        let title = element_text(&title_el);
        if title.is_empty() {
            continue;
        }

        let link_el = match &selectors.link {
            Some(sel) => container.select(sel).next(),
            None => Some(title_el),
        };
        let Some(url) = link_el
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| base.join(href.trim()).ok())
        else {
            continue;
        };

        let mut item = FeedItem::new(&info.name, info.source_type, title, url.to_string())
            .with_fetched_at(now)
            .with_published_at(now);

        if let Some(author) = select_text(&container, selectors.author.as_ref()) {
            item = item.with_author(author);
        }
        if let Some(sel) = &selectors.date {
            let published = container.select(sel).next().and_then(|el| {
                el.value()
                    .attr("datetime")
                    .or_else(|| el.value().attr("title"))
                    .and_then(parse_loose_date)
                    .or_else(|| parse_loose_date(&element_text(&el)))
            });
            if let Some(published) = published {
                item = item.with_published_at(published);
            }
        }
        if let Some(summary) = select_text(&container, selectors.summary.as_ref()) {
            item = item.with_summary(truncate_chars(&summary, MAX_SUMMARY_LENGTH));
        }
        items.push(item);
    }

    let next_page = selectors.next_page.as_ref().and_then(|sel| {
        document
            .select(sel)
            .next()
            .and_then(|el| el.value().attr("href"))
            .and_then(|href| base.join(href.trim()).ok())
            .map(|u| u.to_string())
    });

    Ok(ForumPage { items, next_page })
}

fn element_text(el: &ElementRef<'_>) -> String {
    strip_html(&el.text().collect::<Vec<_>>().join(" "))
}

fn select_text(container: &ElementRef<'_>, selector: Option<&Selector>) -> Option<String> {
    let el = container.select(selector?).next()?;
    let text = element_text(&el);
    (!text.is_empty()).then_some(text)
}
