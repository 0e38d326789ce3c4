//! Configuration to aggregator wiring tests.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flyfeed::feed::build_fetchers;
use flyfeed::{Aggregator, Config, HostRateLimiter, KeywordTagger, MemoryCache, SourceType};

const CONFIG: &str = r#"
[aggregator]
retention_days = 30
cache_ttl_hours = 12

[fetch]
max_items = 20

[[tagger.rules]]
keyword = "tinyhawk"
tag = "Tiny Whoop"

[[sources]]
name = "DroneDJ"
kind = "rss"
url = "https://dronedj.com/feed/"
description = "Drone industry news"

[[sources]]
id = "r-fpv"
name = "r/fpv"
kind = "reddit"
url = "https://www.reddit.com/r/fpv/hot.json"

[[sources]]
name = "Joshua Bardwell"
kind = "youtube"
url = "https://www.youtube.com/feeds/videos.xml?channel_id=UCX3eufnI7A2I7IkKHZn8KSQ"
enabled = false

[[sources]]
name = "IntoFPV"
kind = "forum"
url = "https://intofpv.com/f-news"

[sources.selectors]
container = "tr.thread"
title = "a.subject"
"#;

#[test]
fn test_config_file_builds_aggregator() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(CONFIG.as_bytes()).unwrap();

    let config = Config::load(file.path()).unwrap();
    let limiter = Arc::new(HostRateLimiter::new(Duration::from_millis(
        config.aggregator.rate_limit_interval_ms,
    )));
    let fetchers = build_fetchers(&config, limiter).unwrap();
    assert_eq!(fetchers.len(), 3);

    let aggregator = Aggregator::new(
        fetchers,
        Arc::new(KeywordTagger::with_rules(&config.tagger.rules)),
        Arc::new(MemoryCache::new()),
        &config.aggregator,
    );
    assert_eq!(aggregator.retention_days(), 30);

    let sources = aggregator.get_sources();
    let ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["dronedj", "r-fpv", "intofpv"]);
    assert_eq!(sources[0].description, "Drone industry news");
    assert_eq!(sources[2].source_type, SourceType::Forum);
}

#[test]
fn test_invalid_source_rejected() {
    let config = Config::parse(
        r#"
[[sources]]
name = "Broken Forum"
kind = "forum"
url = "https://forum.example.com"
"#,
    )
    .unwrap();
    let limiter = Arc::new(HostRateLimiter::default());
    assert!(build_fetchers(&config, limiter).is_err());
}
