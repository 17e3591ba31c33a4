//! Secrets Manager implementation of [`SecretStore`]

use super::types::{
    CreateSecretRequest, SecretMetadata, SecretRecord, SecretRef, SecretStore, SecretValue,
};
use crate::error::{Error, Result, SecretStoreError};
use async_trait::async_trait;
use aws_sdk_secretsmanager::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_secretsmanager::types::{RotationRulesType, Tag};
use aws_sdk_secretsmanager::Client;
use base64::Engine;
use tracing::{debug, error};

/// Secret store backed by AWS Secrets Manager
#[derive(Debug, Clone)]
pub struct AwsSecretStore {
    client: Client,
}

impl AwsSecretStore {
    /// Create a store from a loaded AWS configuration
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

/// Keep the service error code so callers can classify the failure
fn secret_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    let code = err
        .as_service_error()
        .and_then(|service| service.code())
        .unwrap_or("Unknown")
        .to_string();
    let message = DisplayErrorContext(&err).to_string();
    error!(code = %code, "Secrets Manager call failed: {message}");
    SecretStoreError::new(code, message).into()
}

/// Binary secrets hold base64 text; fall back to the raw bytes otherwise
fn decode_binary(bytes: &[u8]) -> Vec<u8> {
    base64::engine::general_purpose::STANDARD
        .decode(bytes)
        .unwrap_or_else(|_| bytes.to_vec())
}

#[async_trait]
impl SecretStore for AwsSecretStore {
    async fn get_secret(&self, secret_id: &str, stage: &str) -> Result<SecretRecord> {
        let output = self
            .client
            .get_secret_value()
            .secret_id(secret_id)
            .version_stage(stage)
            .send()
            .await
            .map_err(secret_error)?;

        let value = if let Some(text) = output.secret_string() {
            SecretValue::Text(text.to_string())
        } else if let Some(binary) = output.secret_binary() {
            SecretValue::Binary(decode_binary(binary.as_ref()))
        } else {
            return Err(Error::malformed_secret(
                secret_id,
                "secret has neither a string nor a binary value",
            ));
        };

        debug!(secret_id, stage, "Secret loaded");
        Ok(SecretRecord {
            arn: output.arn().unwrap_or_default().to_string(),
            name: output.name().unwrap_or(secret_id).to_string(),
            version_id: output.version_id().map(str::to_string),
            value,
        })
    }

    async fn create_secret(&self, request: CreateSecretRequest) -> Result<SecretRef> {
        let tags: Vec<Tag> = request
            .tags
            .iter()
            .map(|tag| Tag::builder().key(&tag.key).value(&tag.value).build())
            .collect();

        let output = self
            .client
            .create_secret()
            .name(&request.name)
            .set_kms_key_id(request.kms_key_id.clone())
            .secret_string(&request.value)
            .set_tags((!tags.is_empty()).then_some(tags))
            .send()
            .await
            .map_err(secret_error)?;

        Ok(SecretRef {
            arn: output.arn().unwrap_or_default().to_string(),
            name: output.name().unwrap_or(&request.name).to_string(),
        })
    }

    async fn rotate_secret(&self, secret_id: &str, rotation_arn: &str, days: i64) -> Result<()> {
        self.client
            .rotate_secret()
            .secret_id(secret_id)
            .rotation_lambda_arn(rotation_arn)
            .rotation_rules(
                RotationRulesType::builder()
                    .automatically_after_days(days)
                    .build(),
            )
            .send()
            .await
            .map_err(secret_error)?;
        Ok(())
    }

    async fn delete_secret(&self, secret_id: &str, force: bool) -> Result<()> {
        self.client
            .delete_secret()
            .secret_id(secret_id)
            .force_delete_without_recovery(force)
            .send()
            .await
            .map_err(secret_error)?;
        Ok(())
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        value: &str,
        stage: &str,
    ) -> Result<()> {
        self.client
            .put_secret_value()
            .secret_id(secret_id)
            .client_request_token(token)
            .secret_string(value)
            .version_stages(stage)
            .send()
            .await
            .map_err(secret_error)?;
        Ok(())
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()> {
        self.client
            .update_secret_version_stage()
            .secret_id(secret_id)
            .version_stage(stage)
            .move_to_version_id(move_to)
            .set_remove_from_version_id(remove_from.map(str::to_string))
            .send()
            .await
            .map_err(secret_error)?;
        Ok(())
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        let output = self
            .client
            .describe_secret()
            .secret_id(secret_id)
            .send()
            .await
            .map_err(secret_error)?;

        Ok(SecretMetadata {
            rotation_enabled: output.rotation_enabled().unwrap_or(false),
            version_ids_to_stages: output.version_ids_to_stages().cloned().unwrap_or_default(),
        })
    }
}
