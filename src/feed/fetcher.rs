//! Fetcher contract and the HTTP plumbing shared by all fetchers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use tracing::debug;

use crate::config::{FetchConfig, SourceConfig};
use crate::feed::context::FetchContext;
use crate::feed::types::{FeedItem, SourceInfo};
use crate::rate_limit::HostRateLimiter;
use crate::{FlyfeedError, Result};

/// Connect timeout in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// A source-specific adapter producing normalized feed items.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stable display name.
    fn name(&self) -> &str;

    /// Static descriptor of the source.
    fn source_info(&self) -> SourceInfo;

    /// Fetch at most `max_items` items.
    ///
    /// Network work must go through `ctx` so that deadlines and cancellation
    /// stop it promptly. Parse failures fail the whole fetch.
    async fn fetch(&self, ctx: &FetchContext) -> Result<Vec<FeedItem>>;
}

/// Per-fetcher limits.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Timeout for one fetch.
    pub timeout: Duration,
    /// Maximum number of items one fetch returns.
    pub max_items: usize,
    /// User agent for outgoing requests.
    pub user_agent: String,
    /// Maximum accepted body size in bytes.
    pub max_body_bytes: u64,
}

impl FetcherConfig {
    /// Resolve the limits for one source: source overrides, then global defaults.
    pub fn for_source(defaults: &FetchConfig, source: &SourceConfig) -> Self {
        Self {
            timeout: Duration::from_secs(source.timeout_secs.unwrap_or(defaults.timeout_secs)),
            max_items: source.max_items.unwrap_or(defaults.max_items),
            user_agent: defaults.user_agent.clone(),
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        let defaults = FetchConfig::default();
        Self {
            timeout: Duration::from_secs(defaults.timeout_secs),
            max_items: defaults.max_items,
            user_agent: defaults.user_agent,
            max_body_bytes: defaults.max_body_bytes,
        }
    }
}

/// Rate-limited HTTP client bound to one fetcher's limits.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    limiter: Arc<HostRateLimiter>,
    config: FetcherConfig,
}

impl HttpClient {
    /// Build a client with the fetcher's timeout and user agent.
    pub fn new(config: FetcherConfig, limiter: Arc<HostRateLimiter>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FlyfeedError::Http(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            limiter,
            config,
        })
    }

    /// Limits this client was built with.
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// GET `url` and return the body.
    ///
    /// Waits on the host rate limiter first. The whole exchange, including the
    /// wait, is bounded by `ctx` and by the fetcher timeout.
    pub async fn get_bytes(&self, ctx: &FetchContext, url: &str) -> Result<Vec<u8>> {
        let ctx = ctx.child_with_timeout(self.config.timeout);
        ctx.run(async {
            self.limiter.wait(url).await;
            debug!("GET {}", url);

            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(FlyfeedError::Http(format!(
                    "HTTP {} from {}",
                    response.status(),
                    url
                )));
            }

            let max = self.config.max_body_bytes;
            if let Some(content_length) = response.content_length() {
                if content_length > max {
                    return Err(FlyfeedError::Http(format!(
                        "response too large: {} bytes (max {} bytes)",
                        content_length, max
                    )));
                }
            }

            let bytes = response.bytes().await?;
            if bytes.len() as u64 > max {
                return Err(FlyfeedError::Http(format!(
                    "response too large: {} bytes (max {} bytes)",
                    bytes.len(),
                    max
                )));
            }
            Ok(bytes.to_vec())
        })
        .await
    }
}

/// Strip HTML tags and decode common entities, collapsing whitespace.
pub fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    let mut entity: Option<String> = None;

    for ch in html.chars() {
        if let Some(buf) = entity.as_mut() {
            if ch == ';' {
                let name = std::mem::take(buf);
                entity = None;
                push_entity(&mut text, &name);
                continue;
            }
            if ch.is_ascii_alphanumeric() || ch == '#' {
                buf.push(ch);
                continue;
            }
            // Not an entity after all.
            text.push('&');
            text.push_str(buf);
            entity = None;
        }

        match ch {
            '<' => in_tag = true,
            '>' if in_tag => {
                in_tag = false;
                text.push(' ');
            }
            '&' if !in_tag => entity = Some(String::new()),
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    if let Some(buf) = entity {
        text.push('&');
        text.push_str(&buf);
    }

    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn push_entity(out: &mut String, name: &str) {
    let decoded = match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" | "#39" => Some('\''),
        "nbsp" => Some(' '),
        _ => name
            .strip_prefix("#x")
            .or_else(|| name.strip_prefix("#X"))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .or_else(|| name.strip_prefix('#').and_then(|dec| dec.parse().ok()))
            .and_then(char::from_u32),
    };
    match decoded {
        Some(c) => out.push(c),
        None => {
            out.push('&');
            out.push_str(name);
            out.push(';');
        }
    }
}

/// Parse the date formats commonly found on scraped pages.
pub fn parse_loose_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
        assert_eq!(strip_html("<b>Bold</b> text"), "Bold text");
        assert_eq!(strip_html("line<br/>break"), "line break");
    }

    #[test]
    fn test_strip_html_entities() {
        assert_eq!(strip_html("Props &amp; motors"), "Props & motors");
        assert_eq!(strip_html("&lt;tag&gt;"), "<tag>");
        assert_eq!(strip_html("&#65;&#x42;"), "AB");
        assert_eq!(strip_html("it&#39;s"), "it's");
        assert_eq!(strip_html("&unknown;"), "&unknown;");
    }

    #[test]
    fn test_strip_html_bare_ampersand() {
        assert_eq!(strip_html("R&D lab"), "R&D lab");
        assert_eq!(strip_html("Q & A"), "Q & A");
        assert_eq!(strip_html("trailing &"), "trailing &");
    }

    #[test]
    fn test_strip_html_whitespace() {
        assert_eq!(
            strip_html("<p>\n\tMultiple   spaces\n</p>"),
            "Multiple spaces"
        );
    }

    #[test]
    fn test_parse_loose_date() {
        let dt = parse_loose_date("2025-03-01T12:30:00Z").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day(), dt.hour()), (2025, 3, 1, 12));

        let dt = parse_loose_date("Sat, 01 Mar 2025 08:00:00 +0000").unwrap();
        assert_eq!(dt.hour(), 8);

        let dt = parse_loose_date("Mar 1, 2025").unwrap();
        assert_eq!((dt.month(), dt.day()), (3, 1));

        let dt = parse_loose_date("2025-03-01").unwrap();
        assert_eq!(dt.hour(), 0);

        assert!(parse_loose_date("yesterday").is_none());
        assert!(parse_loose_date("  ").is_none());
    }

    #[test]
    fn test_fetcher_config_for_source() {
        let defaults = FetchConfig::default();
        let mut source = SourceConfig::new(
            "r/fpv",
            crate::feed::types::SourceType::Reddit,
            "https://www.reddit.com/r/fpv.json",
        );
        let config = FetcherConfig::for_source(&defaults, &source);
        assert_eq!(config.max_items, defaults.max_items);
        assert_eq!(config.timeout, Duration::from_secs(defaults.timeout_secs));

        source.max_items = Some(5);
        source.timeout_secs = Some(3);
        let config = FetcherConfig::for_source(&defaults, &source);
        assert_eq!(config.max_items, 5);
        assert_eq!(config.timeout, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_get_bytes_respects_cancelled_context() {
        let client = HttpClient::new(
            FetcherConfig::default(),
            Arc::new(HostRateLimiter::new(Duration::from_millis(1))),
        )
        .unwrap();
        let (ctx, handle) = FetchContext::with_cancel();
        handle.cancel();

        let result = client.get_bytes(&ctx, "https://example.com/feed").await;
        assert!(matches!(result, Err(FlyfeedError::Cancelled)));
    }
}
