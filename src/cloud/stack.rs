//! CloudFormation implementation of [`StackInspector`]

use super::types::{StackEvent, StackInspector};
use crate::error::{Error, Result};
use crate::types::StackTag;
use async_trait::async_trait;
use aws_sdk_cloudformation::error::DisplayErrorContext;
use aws_sdk_cloudformation::types::Tag;
use aws_sdk_cloudformation::Client;

/// Stack inspector backed by AWS CloudFormation
#[derive(Debug, Clone)]
pub struct CloudFormationInspector {
    client: Client,
}

impl CloudFormationInspector {
    /// Create an inspector from a loaded AWS configuration
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl StackInspector for CloudFormationInspector {
    async fn stack_tags(&self, stack_id: &str) -> Result<Vec<StackTag>> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| Error::stack(DisplayErrorContext(&e).to_string()))?;

        let stack = output
            .stacks()
            .first()
            .ok_or_else(|| Error::stack(format!("stack {stack_id} not found")))?;
        Ok(stack.tags().iter().filter_map(stack_tag).collect())
    }

    async fn stack_events(&self, stack_id: &str) -> Result<Vec<StackEvent>> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(stack_id)
            .send()
            .await
            .map_err(|e| Error::stack(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .stack_events()
            .iter()
            .map(|event| StackEvent {
                logical_resource_id: event.logical_resource_id().map(str::to_string),
                resource_status: event.resource_status().map(|s| s.as_str().to_string()),
                resource_status_reason: event.resource_status_reason().map(str::to_string),
            })
            .collect())
    }
}

/// Keyless tags are dropped; a missing value reads as empty
fn stack_tag(tag: &Tag) -> Option<StackTag> {
    let key = tag.key().filter(|key| !key.is_empty())?;
    Some(StackTag::new(key, tag.value().unwrap_or_default()))
}
