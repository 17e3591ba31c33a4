//! Managed secret rotation
//!
//! Implements the four-step rotation protocol for the secrets of m2m
//! applications. `createSecret` rotates the client secret remotely and
//! stages the new credentials as `AWSPENDING`; `testSecret` checks them
//! against the identity provider; `finishSecret` promotes them to
//! `AWSCURRENT`.

use crate::cloud::{SecretStore, STAGE_CURRENT, STAGE_PENDING};
use crate::error::{Error, Result, SecretErrorKind};
use crate::provider::{IdentityProvider, ProviderFactory};
use crate::types::{Document, JsonValue};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// A rotation request from the secret store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RotationEvent {
    /// Secret ARN or name
    pub secret_id: String,
    /// Version id of the pending secret
    pub client_request_token: String,
    pub step: String,
}

/// Rotation protocol step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationStep {
    CreateSecret,
    SetSecret,
    TestSecret,
    FinishSecret,
}

impl FromStr for RotationStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "createSecret" => Ok(Self::CreateSecret),
            "setSecret" => Ok(Self::SetSecret),
            "testSecret" => Ok(Self::TestSecret),
            "finishSecret" => Ok(Self::FinishSecret),
            _ => Err(Error::rotation("Invalid step parameter")),
        }
    }
}

impl fmt::Display for RotationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CreateSecret => "createSecret",
            Self::SetSecret => "setSecret",
            Self::TestSecret => "testSecret",
            Self::FinishSecret => "finishSecret",
        };
        f.write_str(name)
    }
}

/// Handler for rotation events
pub struct SecretRotator {
    secrets: Arc<dyn SecretStore>,
    providers: Arc<dyn ProviderFactory>,
}

impl SecretRotator {
    pub fn new(secrets: Arc<dyn SecretStore>, providers: Arc<dyn ProviderFactory>) -> Self {
        Self { secrets, providers }
    }

    /// Run one rotation step
    pub async fn handle(&self, event: &RotationEvent) -> Result<()> {
        let secret_id = event.secret_id.as_str();
        let token = event.client_request_token.as_str();
        info!(secret = secret_id, step = %event.step, "Rotating secret");

        let metadata = self.secrets.describe_secret(secret_id).await?;
        if !metadata.rotation_enabled {
            return Err(rejected(format!(
                "Secret {secret_id} is not enabled for rotation"
            )));
        }
        let stages = metadata.stages(token).ok_or_else(|| {
            rejected(format!(
                "Secret version {token} has no stage for rotation of secret {secret_id}."
            ))
        })?;
        if stages.iter().any(|stage| stage == STAGE_CURRENT) {
            info!(secret = secret_id, token, "Secret version already set as AWSCURRENT");
            return Ok(());
        }
        if !stages.iter().any(|stage| stage == STAGE_PENDING) {
            return Err(rejected(format!(
                "Secret version {token} not set as AWSPENDING for rotation of secret {secret_id}."
            )));
        }

        let current = self.credentials(secret_id, STAGE_CURRENT).await?;
        let tenant = field(&current, "tenant", secret_id)?;
        info!(secret = secret_id, tenant, "Resolved tenant");
        let provider = self.providers.provider(tenant).await?;

        match event.step.parse::<RotationStep>()? {
            RotationStep::CreateSecret => {
                self.create_secret(provider.as_ref(), secret_id, token, current)
                    .await
            }
            RotationStep::SetSecret => Ok(()),
            RotationStep::TestSecret => self.test_secret(provider.as_ref(), secret_id).await,
            RotationStep::FinishSecret => self.finish_secret(secret_id, token).await,
        }
    }

    async fn credentials(&self, secret_id: &str, stage: &str) -> Result<Document> {
        self.secrets.get_secret(secret_id, stage).await?.json()
    }

    /// Rotate the client secret and stage the new credentials as pending
    async fn create_secret(
        &self,
        provider: &dyn IdentityProvider,
        secret_id: &str,
        token: &str,
        current: Document,
    ) -> Result<()> {
        let client_id = field(&current, "client_id", secret_id)?;
        let new_secret = provider.rotate_client_secret(client_id).await?;

        let mut pending = current.clone();
        pending.insert("client_secret".to_string(), JsonValue::String(new_secret));
        let value = serde_json::to_string(&pending)?;

        match self
            .secrets
            .put_secret_value(secret_id, token, &value, STAGE_PENDING)
            .await
        {
            Ok(()) => {
                info!(secret = secret_id, "Pending secret created");
                Ok(())
            }
            Err(err) if err.secret_kind() == Some(SecretErrorKind::ResourceExists) => {
                info!(secret = secret_id, "Pending version already exists, rolling back client secret");
                let mut restore = Document::new();
                restore.insert(
                    "client_secret".to_string(),
                    current.get("client_secret").cloned().unwrap_or(JsonValue::Null),
                );
                provider.update_application(client_id, &restore).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Check that the pending credentials are the ones the provider holds
    async fn test_secret(&self, provider: &dyn IdentityProvider, secret_id: &str) -> Result<()> {
        let pending = self.credentials(secret_id, STAGE_PENDING).await?;
        let client_id = field(&pending, "client_id", secret_id)?;

        let application = provider.get_application(client_id, &["client_secret"]).await?;
        if application.get("client_secret") != pending.get("client_secret") {
            error!(secret = secret_id, client_id, "Pending secret does not match the application");
            return Err(Error::rotation("test_secret: secrets do not match"));
        }
        Ok(())
    }

    /// Promote the token's version to current
    async fn finish_secret(&self, secret_id: &str, token: &str) -> Result<()> {
        let metadata = self.secrets.describe_secret(secret_id).await?;
        let current = metadata.version_with_stage(STAGE_CURRENT);
        if current == Some(token) {
            info!(secret = secret_id, token, "Version already marked as AWSCURRENT");
            return Ok(());
        }

        self.secrets
            .update_secret_version_stage(secret_id, STAGE_CURRENT, token, current)
            .await?;
        info!(secret = secret_id, token, "Set AWSCURRENT stage");
        Ok(())
    }
}

fn rejected(message: String) -> Error {
    error!("{message}");
    Error::rotation(message)
}

fn field<'a>(credentials: &'a Document, key: &str, secret_id: &str) -> Result<&'a str> {
    credentials
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| Error::malformed_secret(secret_id, format!("missing '{key}'")))
}

#[cfg(test)]
mod tests;
