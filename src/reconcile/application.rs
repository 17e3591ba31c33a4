//! Application reconciler
//!
//! Machine-to-machine applications keep their credentials in a managed,
//! rotated secret whose name is the physical id. Every other type keeps its
//! client secret in the parameter store and uses the client id as physical
//! id.

use super::connections::{apply_changes, enable_all, ConnectionChanges};
use super::{
    string_list_prop, string_prop, tenant, tolerate_invalid_identifier, validate_properties,
    ReconcileContext, Reconciler, Services,
};
use crate::cloud::{CreateSecretRequest, STAGE_CURRENT};
use crate::config::ROTATION_DAYS;
use crate::error::{Error, Result, SecretErrorKind};
use crate::provider::{CreatedApplication, IdentityProvider};
use crate::schemas::TAG_SCHEMA;
use crate::types::{Document, JsonValue, ResourceKind};
use crate::validation::{alphanumeric_lowercase, validate};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

const M2M_TYPE: &str = "m2m";
const ALLOW_AD_GROUPS: &str = "AllowAdGroups";

/// Contents of the managed secret of an m2m application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct M2mCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant: String,
}

/// Reconciler for `Authn_Application`
pub struct ApplicationReconciler {
    services: Arc<Services>,
}

impl ApplicationReconciler {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Store the credentials of a freshly created application and enable
    /// its connections
    async fn finish_create(
        &self,
        provider: &dyn IdentityProvider,
        props: &Document,
        created: &CreatedApplication,
        ctx: &mut ReconcileContext,
    ) -> Result<String> {
        let connections = string_list_prop(props, "Connections");
        let failed = enable_all(provider, &connections, &created.client_id).await;
        if !failed.is_empty() {
            return Err(Error::ConnectionMembership {
                failed_add: failed,
                failed_remove: Vec::new(),
            });
        }

        let settings = &self.services.settings;
        if !is_m2m(props) {
            let parameter = settings.client_secret_parameter(&created.client_id);
            self.services
                .parameters
                .put_secure_string(&parameter, &created.client_secret)
                .await?;
            ctx.output("ClientSecret", parameter);
            return Ok(created.client_id.clone());
        }

        let rotation = settings
            .rotation
            .as_deref()
            .ok_or_else(|| Error::config("ROTATION must name the rotation function"))?;
        let name = string_prop(props, "Name").ok_or_else(|| Error::missing_field("Name"))?;
        let secret_name = settings.m2m_secret_name(&alphanumeric_lowercase(name));
        let credentials = M2mCredentials {
            client_id: created.client_id.clone(),
            client_secret: created.client_secret.clone(),
            tenant: tenant(props)?.to_string(),
        };

        let secret = self
            .services
            .secrets
            .create_secret(CreateSecretRequest {
                name: secret_name.clone(),
                kms_key_id: settings.kms_key_id.clone(),
                value: serde_json::to_string(&credentials)?,
                tags: ctx.stack_tags.clone(),
            })
            .await?;
        self.services
            .secrets
            .rotate_secret(&secret_name, rotation, ROTATION_DAYS)
            .await?;
        info!(secret = %secret_name, "Managed secret created");

        ctx.output("Arn", secret.arn);
        ctx.output("Name", secret_name.clone());
        Ok(secret_name)
    }

    /// Client id held by the managed secret named `secret_id`
    async fn client_id_from_secret(&self, secret_id: &str) -> Result<(String, String)> {
        let record = self
            .services
            .secrets
            .get_secret(secret_id, STAGE_CURRENT)
            .await?;
        let credentials: M2mCredentials = record.json()?;
        Ok((credentials.client_id, record.arn))
    }
}

fn is_m2m(props: &Document) -> bool {
    string_prop(props, "Type") == Some(M2M_TYPE)
}

/// Client metadata contributed by the allow-listed tags
fn tag_metadata(tags: &Document) -> Result<Document> {
    validate(tags, &TAG_SCHEMA).map_err(|errors| Error::Validation { errors })
}

/// Merge entries into the document's `client_metadata`
fn merge_metadata(document: &mut Document, entries: Document) {
    let metadata = document
        .entry("client_metadata")
        .or_insert_with(|| JsonValue::Object(Document::new()));
    if !metadata.is_object() {
        *metadata = JsonValue::Object(Document::new());
    }
    if let JsonValue::Object(map) = metadata {
        map.extend(entries);
    }
}

#[async_trait]
impl Reconciler for ApplicationReconciler {
    async fn create(&self, props: &Document, ctx: &mut ReconcileContext) -> Result<String> {
        let mut validated = validate_properties(ResourceKind::Application, props)?;
        merge_metadata(&mut validated, tag_metadata(&ctx.tags)?);

        let provider = self.services.provider_for(props).await?;
        let created = provider.create_application(&validated).await?;
        info!(client_id = %created.client_id, "Application created");
        ctx.output("ClientId", created.client_id.clone());

        match self.finish_create(provider.as_ref(), props, &created, ctx).await {
            Ok(physical_id) => Ok(physical_id),
            Err(err) => {
                error!(
                    client_id = %created.client_id,
                    error = %err,
                    "Application setup failed, deleting the application"
                );
                if let Err(cleanup) = provider.delete_application(&created.client_id).await {
                    error!(
                        client_id = %created.client_id,
                        error = %cleanup,
                        "Failed to delete the partially created application"
                    );
                }
                Err(err)
            }
        }
    }

    async fn update(
        &self,
        physical_id: &str,
        props: &Document,
        old_props: &Document,
        ctx: &mut ReconcileContext,
    ) -> Result<String> {
        let mut validated = validate_properties(ResourceKind::Application, props)?;

        let mut metadata = Document::new();
        if old_props.contains_key(ALLOW_AD_GROUPS) && !props.contains_key(ALLOW_AD_GROUPS) {
            metadata.insert(ALLOW_AD_GROUPS.to_string(), JsonValue::Null);
        }
        metadata.extend(tag_metadata(&ctx.tags)?);
        merge_metadata(&mut validated, metadata);

        let current_type = string_prop(props, "Type");
        match string_prop(old_props, "Type") {
            None => warn!(
                physical_id,
                "Previous properties have no Type, assuming it is unchanged"
            ),
            Some(previous) if Some(previous) != current_type => {
                return Err(Error::TypeChangeNotSupported {
                    from: previous.to_string(),
                    to: current_type.unwrap_or_default().to_string(),
                });
            }
            Some(_) => {}
        }

        let provider = self.services.provider_for(props).await?;
        let client_id = if is_m2m(props) {
            let (client_id, arn) = self.client_id_from_secret(physical_id).await?;
            ctx.output("Arn", arn);
            ctx.output("Name", physical_id);
            client_id
        } else {
            physical_id.to_string()
        };

        let changes = ConnectionChanges::between(
            &string_list_prop(old_props, "Connections"),
            &string_list_prop(props, "Connections"),
        );
        apply_changes(provider.as_ref(), &changes, &client_id).await?;

        let client_id = provider.update_application(&client_id, &validated).await?;
        info!(client_id = %client_id, "Application updated");
        ctx.output("ClientId", client_id);
        Ok(physical_id.to_string())
    }

    async fn delete(&self, physical_id: &str, props: &Document) -> Result<()> {
        let provider = self.services.provider_for(props).await?;

        let managed_secret = is_m2m(props) || physical_id.starts_with('/');
        let client_id = if managed_secret {
            match self.client_id_from_secret(physical_id).await {
                Ok((client_id, _)) => client_id,
                Err(err)
                    if matches!(
                        err.secret_kind(),
                        Some(SecretErrorKind::AccessDenied | SecretErrorKind::NotFound)
                    ) =>
                {
                    error!(
                        secret = physical_id,
                        error = %err,
                        "Unable to load secret for delete, assuming it is gone"
                    );
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        } else {
            physical_id.to_string()
        };

        match provider.delete_application(&client_id).await {
            Ok(()) => info!(client_id = %client_id, "Application deleted"),
            Err(err) if err.is_invalid_identifier() => {
                return tolerate_invalid_identifier(Err(err), "application", &client_id);
            }
            Err(err) => return Err(err),
        }

        if managed_secret {
            self.services.secrets.delete_secret(physical_id, true).await?;
        }

        let parameter = self.services.settings.client_secret_parameter(&client_id);
        if let Err(err) = self.services.parameters.delete(&parameter).await {
            info!(parameter = %parameter, error = %err, "Client secret parameter not found");
        }
        Ok(())
    }
}
