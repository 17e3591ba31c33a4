//! Auth0 management API client

use super::{CreatedApplication, IdentityProvider, ProviderFactory};
use crate::auth::AuthConfig;
use crate::cloud::{SecretStore, STAGE_CURRENT};
use crate::config::Settings;
use crate::error::{Error, RemoteError, Result};
use crate::http::{HttpClient, RequestConfig};
use crate::types::{Document, JsonValue};
use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Client credentials of the application authorized on the management API
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ManagementCredentials {
    #[serde(rename = "AUTH0_CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "AUTH0_CLIENT_SECRET")]
    pub client_secret: String,
}

/// Management API client for one tenant
#[derive(Debug)]
pub struct Auth0Client {
    http: HttpClient,
}

impl Auth0Client {
    /// Client for `tenant` (e.g. `acme-dev.eu.auth0.com`)
    pub fn new(tenant: &str, credentials: &ManagementCredentials, settings: &Settings) -> Result<Self> {
        Self::with_base_url(&format!("https://{tenant}"), credentials, settings)
    }

    /// Client for a management API served at `base_url`
    pub fn with_base_url(
        base_url: &str,
        credentials: &ManagementCredentials,
        settings: &Settings,
    ) -> Result<Self> {
        let auth = AuthConfig::management(
            base_url,
            &credentials.client_id,
            &credentials.client_secret,
        );
        let http = HttpClient::with_auth(settings.http.client_config(base_url), auth)?;
        Ok(Self { http })
    }

    /// Client over a preconfigured HTTP client
    pub fn from_http(http: HttpClient) -> Self {
        Self { http }
    }

    async fn call(&self, method: Method, path: &str, config: RequestConfig) -> Result<JsonValue> {
        let response = self
            .http
            .request(method, path, config)
            .await
            .map_err(into_remote)?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(JsonValue::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn send_document(&self, method: Method, path: &str, fields: &Document) -> Result<JsonValue> {
        self.call(
            method,
            path,
            RequestConfig::new().json(JsonValue::Object(fields.clone())),
        )
        .await
    }

    async fn enabled_clients(&self, connection_id: &str) -> Result<Vec<String>> {
        let connection = self
            .call(
                Method::GET,
                &format!("/api/v2/connections/{}", encode(connection_id)),
                RequestConfig::new().query("fields", "enabled_clients"),
            )
            .await?;
        Ok(connection
            .get("enabled_clients")
            .and_then(JsonValue::as_array)
            .map(|clients| {
                clients
                    .iter()
                    .filter_map(JsonValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set_enabled_clients(&self, connection_id: &str, clients: Vec<String>) -> Result<()> {
        self.call(
            Method::PATCH,
            &format!("/api/v2/connections/{}", encode(connection_id)),
            RequestConfig::new().json(json!({ "enabled_clients": clients })),
        )
        .await?;
        Ok(())
    }
}

/// Status errors from the management API become classified remote errors
fn into_remote(err: Error) -> Error {
    match err {
        Error::HttpStatus { status, body } => RemoteError::from_response(status, &body).into(),
        other => other,
    }
}

fn encode(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}

fn string_field(value: &JsonValue, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::missing_field(field))
}

#[async_trait]
impl IdentityProvider for Auth0Client {
    async fn create_application(&self, fields: &Document) -> Result<CreatedApplication> {
        let client = self.send_document(Method::POST, "/api/v2/clients", fields).await?;
        Ok(CreatedApplication {
            client_id: string_field(&client, "client_id")?,
            client_secret: string_field(&client, "client_secret")?,
        })
    }

    async fn update_application(&self, client_id: &str, fields: &Document) -> Result<String> {
        let client = self
            .send_document(
                Method::PATCH,
                &format!("/api/v2/clients/{}", encode(client_id)),
                fields,
            )
            .await?;
        string_field(&client, "client_id")
    }

    async fn delete_application(&self, client_id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/api/v2/clients/{}", encode(client_id)),
            RequestConfig::new(),
        )
        .await?;
        Ok(())
    }

    async fn create_api(&self, fields: &Document) -> Result<String> {
        let server = self
            .send_document(Method::POST, "/api/v2/resource-servers", fields)
            .await?;
        string_field(&server, "id")
    }

    async fn update_api(&self, api_id: &str, fields: &Document) -> Result<()> {
        self.send_document(
            Method::PATCH,
            &format!("/api/v2/resource-servers/{}", encode(api_id)),
            fields,
        )
        .await?;
        Ok(())
    }

    async fn delete_api(&self, api_id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/api/v2/resource-servers/{}", encode(api_id)),
            RequestConfig::new(),
        )
        .await?;
        Ok(())
    }

    async fn create_grant(&self, fields: &Document) -> Result<String> {
        let grant = self
            .send_document(Method::POST, "/api/v2/client-grants", fields)
            .await?;
        string_field(&grant, "id")
    }

    async fn delete_grant(&self, grant_id: &str) -> Result<()> {
        self.call(
            Method::DELETE,
            &format!("/api/v2/client-grants/{}", encode(grant_id)),
            RequestConfig::new(),
        )
        .await?;
        Ok(())
    }

    async fn add_to_connection(&self, connection_id: &str, client_id: &str) -> Result<()> {
        let mut clients = self.enabled_clients(connection_id).await?;
        if !clients.iter().any(|c| c == client_id) {
            clients.push(client_id.to_string());
        }
        debug!(connection_id, client_id, "Enabling connection");
        self.set_enabled_clients(connection_id, clients).await
    }

    async fn remove_from_connection(&self, connection_id: &str, client_id: &str) -> Result<()> {
        let mut clients = self.enabled_clients(connection_id).await?;
        clients.retain(|c| c != client_id);
        debug!(connection_id, client_id, "Disabling connection");
        self.set_enabled_clients(connection_id, clients).await
    }

    async fn rotate_client_secret(&self, client_id: &str) -> Result<String> {
        let client = self
            .call(
                Method::POST,
                &format!("/api/v2/clients/{}/rotate-secret", encode(client_id)),
                RequestConfig::new(),
            )
            .await?;
        string_field(&client, "client_secret")
    }

    async fn get_application(&self, client_id: &str, fields: &[&str]) -> Result<Document> {
        let mut config = RequestConfig::new();
        if !fields.is_empty() {
            config = config
                .query("fields", fields.join(","))
                .query("include_fields", "true");
        }
        let client = self
            .call(
                Method::GET,
                &format!("/api/v2/clients/{}", encode(client_id)),
                config,
            )
            .await?;
        match client {
            JsonValue::Object(document) => Ok(document),
            _ => Err(Error::Other(format!(
                "unexpected application payload for {client_id}"
            ))),
        }
    }

    async fn list_resource_servers(&self, page: u32, per_page: u32) -> Result<Vec<Document>> {
        let servers = self
            .call(
                Method::GET,
                "/api/v2/resource-servers",
                RequestConfig::new()
                    .query("page", page.to_string())
                    .query("per_page", per_page.to_string()),
            )
            .await?;
        Ok(servers
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object().cloned())
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Builds management API clients from credentials kept in the secret store
pub struct Auth0ProviderFactory {
    settings: Settings,
    secrets: Arc<dyn SecretStore>,
}

impl Auth0ProviderFactory {
    /// Create a factory reading credentials through `secrets`
    pub fn new(settings: Settings, secrets: Arc<dyn SecretStore>) -> Self {
        Self { settings, secrets }
    }

    /// Management credentials for a tenant
    pub async fn credentials(&self, tenant: &str) -> Result<ManagementCredentials> {
        let secret_id = self.settings.management_secret_id(tenant);
        self.secrets.get_secret(&secret_id, STAGE_CURRENT).await?.json()
    }
}

#[async_trait]
impl ProviderFactory for Auth0ProviderFactory {
    async fn provider(&self, tenant: &str) -> Result<Arc<dyn IdentityProvider>> {
        let credentials = self.credentials(tenant).await?;
        info!(
            tenant,
            client_id = %credentials.client_id,
            "Building management client"
        );
        Ok(Arc::new(Auth0Client::new(tenant, &credentials, &self.settings)?))
    }
}
