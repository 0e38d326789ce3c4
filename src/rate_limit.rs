//! Per-host request throttling.
//!
//! Every fetcher calls [`HostRateLimiter::wait`] before touching the network.
//! Requests to the same host are spaced at least `min_interval` apart; requests
//! to different hosts never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

/// Last request time for one host, `None` until the first request.
type HostSlot = Arc<tokio::sync::Mutex<Option<Instant>>>;

/// Throttle that enforces a minimum interval between requests per host.
///
/// # Example
///
/// ```
/// use flyfeed::rate_limit::HostRateLimiter;
/// use std::time::Duration;
///
/// let rt = tokio::runtime::Runtime::new().unwrap();
/// rt.block_on(async {
///     let limiter = HostRateLimiter::new(Duration::from_millis(10));
///     limiter.wait("https://www.reddit.com/r/fpv.json").await;
///     limiter.wait("www.reddit.com").await; // same bucket, waits ~10ms
/// });
/// ```
#[derive(Debug)]
pub struct HostRateLimiter {
    /// Minimum spacing between two requests to the same host.
    min_interval: Duration,
    /// Per-host slots. The outer lock is only held to look up or insert a slot.
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostRateLimiter {
    /// Create a limiter with the given per-host interval.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Configured per-host interval.
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Block until a request to `host_or_url` is allowed, then record it.
    ///
    /// Accepts either a bare host (`example.com`) or a full URL; both map to
    /// the same bucket.
    pub async fn wait(&self, host_or_url: &str) {
        let key = host_key(host_or_url);
        let slot = self.slot(&key);

        // Held across the sleep so concurrent callers for this host queue up.
        let mut last = slot.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                debug!("Rate limiting {} for {:?}", key, ready_at - Instant::now());
                sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Number of hosts seen so far.
    pub fn tracked_hosts(&self) -> usize {
        self.hosts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn slot(&self, key: &str) -> HostSlot {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts.entry(key.to_string()).or_default().clone()
    }
}

impl Default for HostRateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

/// Normalize a host or URL into the bucket key (lowercase host).
pub fn host_key(host_or_url: &str) -> String {
    let trimmed = host_or_url.trim();
    if let Ok(parsed) = url::Url::parse(trimmed) {
        if let Some(host) = parsed.host_str() {
            return host.to_ascii_lowercase();
        }
    }
    // Bare host, possibly with a port or path.
    trimmed
        .split('/')
        .next()
        .unwrap_or(trimmed)
        .to_ascii_lowercase()
}
