//! Api reconciler

use super::{string_prop, tolerate_invalid_identifier, validate_properties, ReconcileContext, Reconciler, Services};
use crate::error::Result;
use crate::provider::{find_resource_server, IdentityProvider};
use crate::types::{Document, JsonValue, ResourceKind};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Reconciler for `Authn_Api`
pub struct ApiReconciler {
    services: Arc<Services>,
}

impl ApiReconciler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Create the resource server. An existing server with the same
    /// identifier is adopted.
    async fn create_api(&self, provider: &dyn IdentityProvider, validated: &Document) -> Result<String> {
        match provider.create_api(validated).await {
            Ok(api_id) => Ok(api_id),
            Err(err) if err.is_conflict() => {
                let identifier = validated
                    .get("identifier")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default();
                let existing =
                    find_resource_server(provider, identifier, self.services.settings.page_delay())
                        .await?;
                match existing {
                    Some(api_id) => {
                        warn!(api_id = %api_id, identifier, "Api already exists, adopting it");
                        Ok(api_id)
                    }
                    None => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }
}

fn record_outputs(ctx: &mut ReconcileContext, api_id: &str, props: &Document) {
    ctx.output("ApiId", api_id);
    ctx.output("Audience", string_prop(props, "Audience").unwrap_or_default());
}

#[async_trait]
impl Reconciler for ApiReconciler {
    async fn create(&self, props: &Document, ctx: &mut ReconcileContext) -> Result<String> {
        let validated = validate_properties(ResourceKind::Api, props)?;
        let provider = self.services.provider_for(props).await?;

        let api_id = self.create_api(provider.as_ref(), &validated).await?;
        info!(api_id = %api_id, "Api created");
        record_outputs(ctx, &api_id, props);
        Ok(api_id)
    }

    async fn update(
        &self,
        physical_id: &str,
        props: &Document,
        old_props: &Document,
        ctx: &mut ReconcileContext,
    ) -> Result<String> {
        let mut validated = validate_properties(ResourceKind::Api, props)?;
        let provider = self.services.provider_for(props).await?;

        let api_id = if props.get("Audience") == old_props.get("Audience") {
            validated.remove("identifier");
            provider.update_api(physical_id, &validated).await?;
            info!(api_id = physical_id, "Api updated");
            physical_id.to_string()
        } else {
            info!(api_id = physical_id, "New audience, replacing the api");
            let api_id = self.create_api(provider.as_ref(), &validated).await?;
            tolerate_invalid_identifier(provider.delete_api(physical_id).await, "api", physical_id)?;
            api_id
        };

        record_outputs(ctx, &api_id, props);
        Ok(api_id)
    }

    async fn delete(&self, physical_id: &str, props: &Document) -> Result<()> {
        let provider = self.services.provider_for(props).await?;
        tolerate_invalid_identifier(provider.delete_api(physical_id).await, "api", physical_id)
    }
}
