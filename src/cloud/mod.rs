//! Cloud collaborators
//!
//! Typed interfaces for the managed secret store, the parameter store and
//! the stack orchestration service, with AWS implementations.
//!
//! - **SecretStore**: Secrets Manager (m2m credentials, management credentials)
//! - **ParameterStore**: SSM (client secrets of interactive applications)
//! - **StackInspector**: CloudFormation (stack tags and events)

mod parameter_store;
mod secrets_manager;
mod stack;
mod types;

pub use parameter_store::SsmParameterStore;
pub use secrets_manager::AwsSecretStore;
pub use stack::CloudFormationInspector;
pub use types::{
    CreateSecretRequest, ParameterStore, SecretMetadata, SecretRecord, SecretRef, SecretStore,
    SecretValue, StackEvent, StackInspector, STAGE_CURRENT, STAGE_PENDING,
};

/// Load the shared AWS configuration from the environment
pub async fn load_aws_config() -> aws_config::SdkConfig {
    aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await
}
