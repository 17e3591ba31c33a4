//! CLI runner - executes commands

use crate::cli::commands::{Cli, Commands, SchemaKind};
use crate::cloud::{AwsSecretStore, CloudFormationInspector, SecretStore, SsmParameterStore};
use crate::config::Settings;
use crate::dispatch::{LifecycleDispatcher, LifecycleEvent};
use crate::error::{Error, Result};
use crate::provider::Auth0ProviderFactory;
use crate::reconcile::Services;
use crate::rotation::{RotationEvent, SecretRotator};
use crate::types::{document_from, JsonValue};
use crate::validation::validate;
use aws_config::BehaviorVersion;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::io::Read;
use std::sync::Arc;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
    settings: Settings,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli, settings: Settings) -> Self {
        Self { cli, settings }
    }

    /// Run the CLI command
    pub async fn run(&self) -> Result<()> {
        match &self.cli.command {
            Commands::Handle { event } => self.handle(event).await,
            Commands::Rotate { event } => self.rotate(event).await,
            Commands::Validate { kind, properties } => self.validate(*kind, properties),
        }
    }

    /// Handle a lifecycle event against the real services
    async fn handle(&self, source: &str) -> Result<()> {
        let event: LifecycleEvent = read_json(source)?;
        let dispatcher = LifecycleDispatcher::new(self.services().await);

        let response = dispatcher.handle(&event).await?;
        info!(physical_id = %response.physical_resource_id, "Lifecycle event handled");
        output(&response)
    }

    /// Run one rotation step
    async fn rotate(&self, source: &str) -> Result<()> {
        let event: RotationEvent = read_json(source)?;
        let services = self.services().await;
        let rotator = SecretRotator::new(services.secrets.clone(), services.providers.clone());

        rotator.handle(&event).await?;
        output(&json!({"SecretId": event.secret_id, "Step": event.step}))
    }

    /// Validate properties offline
    fn validate(&self, kind: SchemaKind, source: &str) -> Result<()> {
        let properties: JsonValue = read_json(source)?;

        match validate(&document_from(properties), kind.schema()) {
            Ok(document) => output(&document),
            Err(errors) => {
                output(&json!({ "errors": &errors }))?;
                Err(Error::Validation { errors })
            }
        }
    }

    /// Service handles backed by the AWS SDK and the management API
    async fn services(&self) -> Arc<Services> {
        let aws = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let secrets: Arc<dyn SecretStore> = Arc::new(AwsSecretStore::new(&aws));
        let providers = Arc::new(Auth0ProviderFactory::new(
            self.settings.clone(),
            secrets.clone(),
        ));

        Arc::new(Services {
            settings: self.settings.clone(),
            providers,
            secrets,
            parameters: Arc::new(SsmParameterStore::new(&aws)),
            stacks: Arc::new(CloudFormationInspector::new(&aws)),
        })
    }
}

/// Read a JSON document from a file, or stdin for `-`
fn read_json<T: DeserializeOwned>(source: &str) -> Result<T> {
    let content = if source == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        fs::read_to_string(source)
            .map_err(|e| Error::config(format!("Failed to read {source}: {e}")))?
    };
    Ok(serde_json::from_str(&content)?)
}

/// Print a message as one line of JSON
fn output<T: Serialize>(message: &T) -> Result<()> {
    println!("{}", serde_json::to_string(message)?);
    Ok(())
}
