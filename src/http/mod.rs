//! Management API transport
//!
//! [`HttpClient`] wraps reqwest with a governor token bucket, bearer
//! authentication and retries. Throttled responses honour `retry-after`
//! and `x-ratelimit-reset` before falling back to the configured
//! [`Backoff`].

mod client;
mod rate_limit;

pub use client::{Backoff, HttpClient, HttpClientConfig, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
