use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// Margin before expiry at which a token is treated as stale
const EXPIRY_MARGIN_SECONDS: i64 = 30;

/// How requests to the management API are authenticated
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// Pre-issued token
    Bearer { token: String },

    /// Tokens obtained from the tenant's token endpoint
    ClientCredentials(ClientCredentials),
}

impl AuthConfig {
    /// Client credentials for the management API of the tenant served at
    /// `base_url` (e.g. `https://example.eu.auth0.com`)
    pub fn management(
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let base = base_url.trim_end_matches('/');
        AuthConfig::ClientCredentials(ClientCredentials {
            token_url: format!("{base}/oauth/token"),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            audience: Some(format!("{base}/api/v2/")),
        })
    }
}

/// OAuth2 client credentials grant parameters
#[derive(Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub audience: Option<String>,
}

impl ClientCredentials {
    /// Form body of the token request
    pub(crate) fn form(&self) -> TokenRequest<'_> {
        TokenRequest {
            grant_type: "client_credentials",
            client_id: &self.client_id,
            client_secret: &self.client_secret,
            audience: self.audience.as_deref(),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .field("audience", &self.audience)
            .finish()
    }
}

#[derive(Serialize)]
pub(crate) struct TokenRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    audience: Option<&'a str>,
}

/// An issued access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    /// `None` for tokens without a lifetime
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Token valid for `seconds` from now
    pub fn valid_for(value: impl Into<String>, seconds: i64) -> Self {
        Self {
            value: value.into(),
            expires_at: Some(Utc::now() + Duration::seconds(seconds)),
        }
    }

    pub fn permanent(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            expires_at: None,
        }
    }

    /// Whether the token can still be sent at `now`
    pub fn is_usable_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map_or(true, |at| now + Duration::seconds(EXPIRY_MARGIN_SECONDS) < at)
    }
}
