//! SSM implementation of [`ParameterStore`]

use super::types::ParameterStore;
use crate::error::{Error, Result};
use async_trait::async_trait;
use aws_sdk_ssm::error::DisplayErrorContext;
use aws_sdk_ssm::types::ParameterType;
use aws_sdk_ssm::Client;

/// Parameter store backed by AWS Systems Manager
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    /// Create a store from a loaded AWS configuration
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameterStore {
    async fn put_secure_string(&self, name: &str, value: &str) -> Result<()> {
        self.client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::SecureString)
            .send()
            .await
            .map_err(|e| Error::parameter_store(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.client
            .delete_parameter()
            .name(name)
            .send()
            .await
            .map_err(|e| Error::parameter_store(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}
