//! Client-side throttling of management API calls

use governor::clock::DefaultClock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as Governor};
use std::num::NonZeroU32;
use std::sync::Arc;

type DirectLimiter = Governor<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

/// Request budget shared by every call made through one client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimiterConfig {
    pub requests_per_second: u32,
    /// Requests allowed back to back before throttling starts
    pub burst_size: u32,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self::per_second(10)
    }
}

impl RateLimiterConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// `requests_per_second` with a burst of the same size
    pub fn per_second(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second)
    }

    /// Governor quota; zero values are raised to one
    fn quota(&self) -> Quota {
        let rate = NonZeroU32::new(self.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(self.burst_size).unwrap_or(NonZeroU32::MIN);
        Quota::per_second(rate).allow_burst(burst)
    }
}

/// Shared token bucket. Clones draw from the same budget.
#[derive(Clone)]
pub struct RateLimiter {
    bucket: Arc<DirectLimiter>,
    config: RateLimiterConfig,
}

impl RateLimiter {
    pub fn new(config: &RateLimiterConfig) -> Self {
        Self {
            bucket: Arc::new(Governor::direct(config.quota())),
            config: *config,
        }
    }

    /// Block until the bucket has a token
    pub async fn wait(&self) {
        self.bucket.until_ready().await;
    }

    /// Take a token if one is available right now
    pub fn try_acquire(&self) -> bool {
        self.bucket.check().is_ok()
    }

    pub fn config(&self) -> RateLimiterConfig {
        self.config
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("requests_per_second", &self.config.requests_per_second)
            .field("burst_size", &self.config.burst_size)
            .finish()
    }
}
