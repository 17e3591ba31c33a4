use super::types::{AccessToken, AuthConfig, ClientCredentials};
use crate::error::{Error, Result};
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

/// Attaches a bearer token to outgoing requests
///
/// Client credential tokens are fetched lazily and shared by every request
/// until they go stale or [`Authenticator::invalidate`] is called. The
/// token lock is held across the fetch so concurrent callers wait for a
/// single token request.
pub struct Authenticator {
    config: AuthConfig,
    token: Mutex<Option<AccessToken>>,
    http: Client,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Authenticator whose token requests go through `http`
    pub fn with_client(config: AuthConfig, http: Client) -> Self {
        Self {
            config,
            token: Mutex::new(None),
            http,
        }
    }

    pub async fn apply(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::Bearer { token } => Ok(request.bearer_auth(token)),
            AuthConfig::ClientCredentials(creds) => {
                Ok(request.bearer_auth(self.current_token(creds).await?))
            }
        }
    }

    /// Drop the cached token. Returns false when there is nothing to refresh.
    pub async fn invalidate(&self) -> bool {
        match self.config {
            AuthConfig::Bearer { .. } => false,
            AuthConfig::ClientCredentials(_) => {
                self.token.lock().await.take();
                true
            }
        }
    }

    async fn current_token(&self, creds: &ClientCredentials) -> Result<String> {
        let mut slot = self.token.lock().await;
        if let Some(token) = slot.as_ref().filter(|t| t.is_usable_at(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.request_token(creds).await?;
        let value = token.value.clone();
        *slot = Some(token);
        Ok(value)
    }

    async fn request_token(&self, creds: &ClientCredentials) -> Result<AccessToken> {
        debug!(token_url = %creds.token_url, client_id = %creds.client_id, "Requesting management token");

        let response = self
            .http
            .post(&creds.token_url)
            .form(&creds.form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::OAuth2 {
                message: format!("token endpoint returned {}: {body}", status.as_u16()),
            });
        }

        let issued: IssuedToken = response.json().await?;
        Ok(match issued.expires_in {
            Some(seconds) => AccessToken::valid_for(issued.access_token, seconds),
            None => AccessToken::permanent(issued.access_token),
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize)]
struct IssuedToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}
