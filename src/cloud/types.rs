//! Collaborator traits and records

use crate::error::{Error, Result};
use crate::types::StackTag;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::collections::HashMap;

/// Version stage of the live secret value
pub const STAGE_CURRENT: &str = "AWSCURRENT";

/// Version stage of a value being rotated in
pub const STAGE_PENDING: &str = "AWSPENDING";

// ============================================================================
// Secret Store
// ============================================================================

/// Decoded secret payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretValue {
    Text(String),
    Binary(Vec<u8>),
}

impl SecretValue {
    /// Parse the payload as JSON
    pub fn parse_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        match self {
            SecretValue::Text(text) => serde_json::from_str(text),
            SecretValue::Binary(bytes) => serde_json::from_slice(bytes),
        }
    }
}

/// A secret version read from the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRecord {
    pub arn: String,
    pub name: String,
    pub version_id: Option<String>,
    pub value: SecretValue,
}

impl SecretRecord {
    /// Parse the value as JSON, reporting failures against this secret
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.value
            .parse_json()
            .map_err(|e| Error::malformed_secret(&self.name, e.to_string()))
    }
}

/// Identity of a created secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRef {
    pub arn: String,
    pub name: String,
}

/// Rotation state of a secret
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecretMetadata {
    pub rotation_enabled: bool,
    pub version_ids_to_stages: HashMap<String, Vec<String>>,
}

impl SecretMetadata {
    /// Stages attached to a version
    pub fn stages(&self, version_id: &str) -> Option<&[String]> {
        self.version_ids_to_stages.get(version_id).map(Vec::as_slice)
    }

    /// Version currently holding `stage`
    pub fn version_with_stage(&self, stage: &str) -> Option<&str> {
        self.version_ids_to_stages
            .iter()
            .find(|(_, stages)| stages.iter().any(|s| s == stage))
            .map(|(version, _)| version.as_str())
    }
}

/// Parameters of a new managed secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSecretRequest {
    pub name: String,
    pub kms_key_id: Option<String>,
    pub value: String,
    pub tags: Vec<StackTag>,
}

/// Managed secret store
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the version of a secret holding `stage`
    async fn get_secret(&self, secret_id: &str, stage: &str) -> Result<SecretRecord>;

    async fn create_secret(&self, request: CreateSecretRequest) -> Result<SecretRef>;

    /// Enable automatic rotation through a rotation function
    async fn rotate_secret(&self, secret_id: &str, rotation_arn: &str, days: i64) -> Result<()>;

    /// Delete a secret, immediately when `force` is set
    async fn delete_secret(&self, secret_id: &str, force: bool) -> Result<()>;

    /// Store a new version identified by `token` and label it with `stage`
    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        value: &str,
        stage: &str,
    ) -> Result<()>;

    /// Move `stage` to `move_to`, removing it from `remove_from`
    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()>;

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata>;
}

// ============================================================================
// Parameter Store
// ============================================================================

/// Encrypted parameter store
#[async_trait]
pub trait ParameterStore: Send + Sync {
    async fn put_secure_string(&self, name: &str, value: &str) -> Result<()>;

    async fn delete(&self, name: &str) -> Result<()>;
}

// ============================================================================
// Stack Service
// ============================================================================

/// One entry of a stack's event history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackEvent {
    pub logical_resource_id: Option<String>,
    pub resource_status: Option<String>,
    pub resource_status_reason: Option<String>,
}

impl StackEvent {
    /// Create an event
    pub fn new(logical_resource_id: &str, resource_status: &str, reason: Option<&str>) -> Self {
        Self {
            logical_resource_id: Some(logical_resource_id.to_string()),
            resource_status: Some(resource_status.to_string()),
            resource_status_reason: reason.map(str::to_string),
        }
    }
}

/// Read access to the enclosing stack
#[async_trait]
pub trait StackInspector: Send + Sync {
    async fn stack_tags(&self, stack_id: &str) -> Result<Vec<StackTag>>;

    /// Events, most recent first
    async fn stack_events(&self, stack_id: &str) -> Result<Vec<StackEvent>>;
}
