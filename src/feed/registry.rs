//! Builds fetchers from the configured sources.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Config, SourceConfig};
use crate::feed::fetcher::{Fetcher, FetcherConfig, HttpClient};
use crate::feed::forum::ForumFetcher;
use crate::feed::reddit::RedditFetcher;
use crate::feed::rss::RssFetcher;
use crate::feed::types::{SourceInfo, SourceType};
use crate::feed::youtube::YoutubeFetcher;
use crate::rate_limit::HostRateLimiter;
use crate::{FlyfeedError, Result};

/// Descriptor for a configured source.
pub fn source_info(source: &SourceConfig) -> SourceInfo {
    let mut info = SourceInfo::new(source.name.trim(), source.kind, source.url.trim())
        .with_id(source.source_id())
        .with_description(source.description.clone());
    info.enabled = source.enabled;
    info
}

/// Build one fetcher for a source.
pub fn build_fetcher(
    config: &Config,
    source: &SourceConfig,
    limiter: Arc<HostRateLimiter>,
) -> Result<Arc<dyn Fetcher>> {
    let info = source_info(source);
    let http = HttpClient::new(FetcherConfig::for_source(&config.fetch, source), limiter)?;

    let fetcher: Arc<dyn Fetcher> = match source.kind {
        SourceType::Rss => Arc::new(RssFetcher::new(info, http)),
        SourceType::Reddit => Arc::new(RedditFetcher::new(info, http)),
        SourceType::Youtube => Arc::new(YoutubeFetcher::new(info, http)),
        SourceType::Forum => {
            let selectors = source.selectors.as_ref().ok_or_else(|| {
                FlyfeedError::Config(format!("forum source {} has no selectors", source.name))
            })?;
            Arc::new(ForumFetcher::new(info, http, selectors, source.max_pages)?)
        }
    };
    Ok(fetcher)
}

/// Build fetchers for every enabled source, in configuration order.
///
/// The configuration is validated first; a source that cannot be built is
/// an error rather than silently skipped.
pub fn build_fetchers(
    config: &Config,
    limiter: Arc<HostRateLimiter>,
) -> Result<Vec<Arc<dyn Fetcher>>> {
    config.validate()?;

    let mut fetchers = Vec::new();
    for source in &config.sources {
        if !source.enabled {
            warn!("Source {} is disabled, skipping", source.name);
            continue;
        }
        fetchers.push(build_fetcher(config, source, limiter.clone())?);
    }
    info!("Registered {} fetcher(s)", fetchers.len());
    Ok(fetchers)
}
