use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use flyfeed::feed::{build_fetchers, start_feed_updater};
use flyfeed::{
    Aggregator, Config, Database, HostRateLimiter, KeywordTagger, MemoryCache,
    SqliteFeedItemStore,
};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = flyfeed::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        flyfeed::logging::init_console_only(&config.logging.level);
    }

    info!("flyfeed - drone and FPV news aggregator");

    let limiter = Arc::new(HostRateLimiter::new(Duration::from_millis(
        config.aggregator.rate_limit_interval_ms,
    )));
    let fetchers = match build_fetchers(&config, limiter) {
        Ok(fetchers) => fetchers,
        Err(e) => {
            error!("Invalid source configuration: {}", e);
            std::process::exit(1);
        }
    };
    if fetchers.is_empty() {
        warn!("No sources configured; add [[sources]] entries to config.toml");
    }

    let tagger = Arc::new(KeywordTagger::with_rules(&config.tagger.rules));
    let mut aggregator = Aggregator::new(
        fetchers,
        tagger,
        Arc::new(MemoryCache::new()),
        &config.aggregator,
    );

    let database = if config.database.enabled {
        match Database::open(&config.database.path).await {
            Ok(db) => {
                aggregator =
                    aggregator.with_store(Arc::new(SqliteFeedItemStore::new(db.pool().clone())));
                Some(db)
            }
            Err(e) => {
                error!("Failed to open database, continuing without persistence: {}", e);
                None
            }
        }
    } else {
        info!("Persistence disabled");
        None
    };

    let aggregator = Arc::new(aggregator);
    info!("Serving {} source(s)", aggregator.get_sources().len());
    let updater = start_feed_updater(aggregator.clone(), &config.aggregator);

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down");
    updater.abort();
    if let Some(db) = database {
        db.close().await;
    }
}
