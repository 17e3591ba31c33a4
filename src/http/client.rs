//! HTTP client for the management API
//!
//! Every request waits for the token bucket and carries the bearer token.
//! Throttling, refused connections and rejected client credential tokens
//! are retried for every method, since the server never acted on the
//! request. Server errors and timeouts are retried only for idempotent
//! methods (GET, PUT, DELETE); a create that may have gone through is never replayed. Other
//! 4xx responses are returned as [`Error::HttpStatus`] with the body intact
//! so the caller can classify them.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the epoch second at which the management API quota resets
const RATE_LIMIT_RESET: &str = "x-ratelimit-reset";

/// Upper bound on a server-requested wait
const MAX_THROTTLE_WAIT: Duration = Duration::from_secs(60);

/// Delay schedule between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub kind: BackoffType,
    pub initial: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            kind: BackoffType::Exponential,
            initial: Duration::from_millis(250),
            max: Duration::from_secs(10),
        }
    }
}

impl Backoff {
    /// Delay before retrying after the zero-based `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.kind {
            BackoffType::Constant => self.initial,
            BackoffType::Linear => self.initial.saturating_mul(attempt + 1),
            BackoffType::Exponential => self.initial.saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max)
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative request paths
    pub base_url: Option<String>,
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: Backoff,
    pub rate_limit: Option<RateLimiterConfig>,
    pub default_headers: HashMap<String, String>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: Backoff::default(),
            rate_limit: Some(RateLimiterConfig::default()),
            default_headers: HashMap::new(),
            user_agent: format!("authn-cr/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn backoff(mut self, kind: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.backoff = Backoff { kind, initial, max };
        self
    }

    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Disable rate limiting
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    /// Add a header sent with every request
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Per-request options
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    pub headers: HashMap<String, String>,
    /// JSON body
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }
}

/// A failed attempt
struct Failure {
    error: Error,
    retryable: bool,
    /// The server may have acted on the request
    delivered: bool,
    /// Server-provided wait, overriding the backoff schedule
    wait: Option<Duration>,
}

impl Failure {
    fn fatal(error: Error) -> Self {
        Self {
            error,
            retryable: false,
            delivered: false,
            wait: None,
        }
    }

    /// Rejected before the server handled it
    fn refused(error: Error) -> Self {
        Self {
            error,
            retryable: true,
            delivered: false,
            wait: None,
        }
    }

    fn may_replay(&self, method: &Method) -> bool {
        self.retryable && (!self.delivered || method.is_idempotent())
    }
}

/// HTTP client with retry and rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Client with the default configuration
    pub fn new() -> Result<Self> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            authenticator: None,
            rate_limiter,
        })
    }

    /// Client authenticating every request with `auth_config`. The token
    /// endpoint is called through the same connection pool.
    pub fn with_auth(config: HttpClientConfig, auth_config: AuthConfig) -> Result<Self> {
        let mut client = Self::with_config(config)?;
        client.authenticator = Some(Authenticator::with_client(
            auth_config,
            client.client.clone(),
        ));
        Ok(client)
    }

    /// Send a request, retrying transient failures
    pub async fn request(&self, method: Method, path: &str, config: RequestConfig) -> Result<Response> {
        let url = self.build_url(path);
        let max_retries = config.max_retries.unwrap_or(self.config.max_retries);
        let timeout = config.timeout.unwrap_or(self.config.timeout);

        let mut attempt = 0;
        loop {
            let failure = match self.send(&method, &url, &config, timeout).await? {
                Ok(response) => {
                    debug!(%method, url = %url, status = response.status().as_u16(), "Request succeeded");
                    return Ok(response);
                }
                Err(failure) => failure,
            };
            if !failure.may_replay(&method) || attempt >= max_retries {
                return Err(failure.error);
            }

            let wait = match failure.wait {
                Some(wait) => wait.min(MAX_THROTTLE_WAIT),
                None => self.config.backoff.delay(attempt),
            };
            attempt += 1;
            warn!(
                %method,
                url = %url,
                attempt,
                max_retries,
                wait_ms = wait.as_millis() as u64,
                error = %failure.error,
                "Retrying request"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// One attempt. The outer error is for failures that retrying cannot
    /// fix, such as token acquisition.
    async fn send(
        &self,
        method: &Method,
        url: &str,
        config: &RequestConfig,
        timeout: Duration,
    ) -> Result<std::result::Result<Response, Failure>> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let mut request = self.client.request(method.clone(), url).timeout(timeout);
        for (key, value) in self.config.default_headers.iter().chain(&config.headers) {
            request = request.header(key.as_str(), value.as_str());
        }
        if !config.query.is_empty() {
            request = request.query(&config.query);
        }
        if let Some(body) = &config.body {
            request = request.json(body);
        }
        if let Some(auth) = &self.authenticator {
            request = auth.apply(request).await?;
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return Ok(Err(Failure {
                    error: Error::Timeout {
                        timeout_ms: timeout.as_millis() as u64,
                    },
                    retryable: true,
                    delivered: true,
                    wait: None,
                }));
            }
            Err(e) if e.is_connect() => return Ok(Err(Failure::refused(Error::Http(e)))),
            Err(e) => return Ok(Err(Failure::fatal(Error::Http(e)))),
        };

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = throttle_wait(response.headers());
            return Ok(Err(Failure {
                wait,
                ..Failure::refused(Error::RateLimited {
                    retry_after_seconds: wait.map_or(0, |w| w.as_secs()),
                })
            }));
        }
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let error = Error::http_status(status.as_u16(), body);
            let failure = match &self.authenticator {
                // A revoked token is replaced on the next attempt
                Some(auth) if status == StatusCode::UNAUTHORIZED => Failure {
                    retryable: auth.invalidate().await,
                    ..Failure::refused(error)
                },
                _ if status.is_server_error() => Failure {
                    retryable: error.is_retryable(),
                    delivered: true,
                    ..Failure::fatal(error)
                },
                _ => Failure::fatal(error),
            };
            return Ok(Err(failure));
        }
        Ok(Ok(response))
    }

    fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Wait requested by a 429 response: `retry-after` seconds, or the time
/// left until the quota resets
pub(crate) fn throttle_wait(headers: &HeaderMap) -> Option<Duration> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
    };

    if let Some(seconds) = header("retry-after") {
        return Some(Duration::from_secs(seconds.max(0) as u64));
    }
    header(RATE_LIMIT_RESET).map(|reset| {
        let now = chrono::Utc::now().timestamp();
        Duration::from_secs((reset - now).max(0) as u64)
    })
}
