//! Background refresh loop.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use crate::config::AggregatorConfig;
use crate::feed::aggregator::Aggregator;
use crate::feed::context::FetchContext;

/// Periodically refreshes an [`Aggregator`].
pub struct FeedUpdater {
    aggregator: Arc<Aggregator>,
    refresh_interval: Duration,
    refresh_timeout: Duration,
}

impl FeedUpdater {
    /// Create an updater using the configured interval and timeout.
    pub fn new(aggregator: Arc<Aggregator>, config: &AggregatorConfig) -> Self {
        Self {
            aggregator,
            refresh_interval: Duration::from_secs(config.refresh_interval_secs.max(1)),
            refresh_timeout: Duration::from_secs(config.refresh_timeout_secs.max(1)),
        }
    }

    /// Interval between cycles.
    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Run one cycle bounded by the refresh timeout.
    pub async fn run_once(&self) {
        let ctx = FetchContext::with_timeout(self.refresh_timeout);
        if let Err(e) = self.aggregator.refresh(&ctx).await {
            error!("Feed refresh failed: {}", e);
        }
    }

    /// Refresh immediately, then every interval. Runs until the task is dropped.
    pub async fn run(&self) {
        info!(
            "Feed updater started (interval: {} seconds)",
            self.refresh_interval.as_secs()
        );

        let mut timer = interval(self.refresh_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            self.run_once().await;
        }
    }
}

/// Start the updater as a background task.
pub fn start_feed_updater(aggregator: Arc<Aggregator>, config: &AggregatorConfig) -> JoinHandle<()> {
    let updater = FeedUpdater::new(aggregator, config);
    tokio::spawn(async move {
        updater.run().await;
    })
}
