//! Grant reconciler
//!
//! Grants are never changed in place. An update re-runs create, and the
//! remote API deduplicates grants on (application, audience).

use super::{tolerate_invalid_identifier, validate_properties, ReconcileContext, Reconciler, Services};
use crate::error::Result;
use crate::types::{Document, JsonValue, ResourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Reconciler for `Authn_Grant`
pub struct GrantReconciler {
    services: Arc<Services>,
}

impl GrantReconciler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }
}

/// Client grant payload from validated properties
fn grant_payload(validated: &Document) -> Document {
    let mut payload = Document::new();
    for (from, to) in [("application_id", "client_id"), ("audience", "audience")] {
        if let Some(value) = validated.get(from) {
            payload.insert(to.to_string(), value.clone());
        }
    }
    payload.insert(
        "scope".to_string(),
        validated
            .get("scope")
            .cloned()
            .unwrap_or_else(|| JsonValue::Array(Vec::new())),
    );
    payload
}

#[async_trait]
impl Reconciler for GrantReconciler {
    async fn create(&self, props: &Document, ctx: &mut ReconcileContext) -> Result<String> {
        let validated = validate_properties(ResourceKind::Grant, props)?;
        let provider = self.services.provider_for(props).await?;

        let grant_id = provider.create_grant(&grant_payload(&validated)).await?;
        info!(grant_id = %grant_id, "Grant created");
        ctx.output("GrantId", grant_id.clone());
        Ok(grant_id)
    }

    async fn update(
        &self,
        physical_id: &str,
        props: &Document,
        _old_props: &Document,
        ctx: &mut ReconcileContext,
    ) -> Result<String> {
        let grant_id = match self.create(props, ctx).await {
            Ok(grant_id) => grant_id,
            Err(err) if err.is_conflict() => {
                warn!(grant_id = physical_id, error = %err, "Grant already exists, keeping it");
                physical_id.to_string()
            }
            Err(err) => return Err(err),
        };
        ctx.output("GrantId", grant_id.clone());
        Ok(grant_id)
    }

    async fn delete(&self, physical_id: &str, props: &Document) -> Result<()> {
        let provider = self.services.provider_for(props).await?;
        tolerate_invalid_identifier(provider.delete_grant(physical_id).await, "grant", physical_id)
    }
}

#[cfg(test)]
mod grant_tests {
    use super::*;
    use crate::types::document_from;
    use serde_json::json;

    #[test]
    fn test_grant_payload_defaults_scope() {
        let validated = document_from(json!({"application_id": "abc", "audience": "https://api"}));

        assert_eq!(
            JsonValue::Object(grant_payload(&validated)),
            json!({"client_id": "abc", "audience": "https://api", "scope": []})
        );
    }
}
