//! Resource reconcilers
//!
//! One reconciler per resource kind turns a lifecycle request into calls
//! against the identity provider and the cloud stores.
//!
//! # Overview
//!
//! - **create** validates the properties, creates the remote resource and
//!   returns the physical resource id. Any later failure compensates by
//!   deleting what was created.
//! - **update** validates the properties and reconciles the remote resource
//!   in place, or replaces it when its identity changed.
//! - **delete** tears the remote resource down. Identifiers the remote API
//!   rejects as malformed count as already deleted.
//!
//! Outputs and tags travel in a [`ReconcileContext`] passed by reference.

mod api;
mod application;
mod connections;
mod grant;

pub use api::ApiReconciler;
pub use application::{ApplicationReconciler, M2mCredentials};
pub use connections::{apply_changes, enable_all, ConnectionChanges};
pub use grant::GrantReconciler;

use crate::cloud::{ParameterStore, SecretStore, StackInspector};
use crate::config::Settings;
use crate::error::{Error, Result};
use crate::provider::{IdentityProvider, ProviderFactory};
use crate::schemas;
use crate::types::{Document, JsonValue, Outputs, ResourceKind, StackTag};
use crate::validation::validate;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Capability handles shared by the reconcilers
pub struct Services {
    pub settings: Settings,
    pub providers: Arc<dyn ProviderFactory>,
    pub secrets: Arc<dyn SecretStore>,
    pub parameters: Arc<dyn ParameterStore>,
    pub stacks: Arc<dyn StackInspector>,
}

impl Services {
    /// Provider for the tenant named in `props`
    pub async fn provider_for(&self, props: &Document) -> Result<Arc<dyn IdentityProvider>> {
        self.providers.provider(tenant(props)?).await
    }
}

/// Per-request state threaded through a reconciliation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileContext {
    /// Stack tags as a map, plus `AllowAdGroups` from the properties
    pub tags: Document,
    /// Raw stack tags, attached to managed secrets
    pub stack_tags: Vec<StackTag>,
    /// Output attributes of the lifecycle response
    pub outputs: Outputs,
}

impl ReconcileContext {
    /// Record an output attribute
    pub fn output(&mut self, key: &str, value: impl Into<String>) {
        self.outputs.insert(key.to_string(), value.into());
    }
}

/// Lifecycle operations for one resource kind
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Create the resource, returning its physical id
    async fn create(&self, props: &Document, ctx: &mut ReconcileContext) -> Result<String>;

    /// Update the resource, returning the (possibly new) physical id
    async fn update(
        &self,
        physical_id: &str,
        props: &Document,
        old_props: &Document,
        ctx: &mut ReconcileContext,
    ) -> Result<String>;

    /// Delete the resource
    async fn delete(&self, physical_id: &str, props: &Document) -> Result<()>;
}

/// Reconciler handling `kind`
pub fn reconciler_for(kind: ResourceKind, services: Arc<Services>) -> Box<dyn Reconciler> {
    match kind {
        ResourceKind::Application => Box::new(ApplicationReconciler::new(services)),
        ResourceKind::Api => Box::new(ApiReconciler::new(services)),
        ResourceKind::Grant => Box::new(GrantReconciler::new(services)),
    }
}

/// Validate resource properties against the schema of `kind`
pub fn validate_properties(kind: ResourceKind, props: &Document) -> Result<Document> {
    validate(props, schemas::for_kind(kind)).map_err(|errors| Error::Validation { errors })
}

/// The `Tenant` property
pub fn tenant(props: &Document) -> Result<&str> {
    props
        .get("Tenant")
        .and_then(JsonValue::as_str)
        .filter(|tenant| !tenant.is_empty())
        .ok_or_else(|| Error::missing_field("Tenant"))
}

/// A string property, if set
pub(crate) fn string_prop<'a>(props: &'a Document, key: &str) -> Option<&'a str> {
    props.get(key).and_then(JsonValue::as_str)
}

/// A list-of-strings property; absent or malformed lists are empty
pub(crate) fn string_list_prop(props: &Document, key: &str) -> Vec<String> {
    props
        .get(key)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(JsonValue::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Treat a malformed identifier on delete as a resource that never existed
pub(crate) fn tolerate_invalid_identifier(result: Result<()>, resource: &str, id: &str) -> Result<()> {
    match result {
        Err(err) if err.is_invalid_identifier() => {
            warn!(
                resource,
                id,
                error = %err,
                "Physical resource id is not a valid id, assuming creation failed"
            );
            Ok(())
        }
        other => other,
    }
}

#[cfg(test)]
mod tests;
