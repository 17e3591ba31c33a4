//! Lifecycle event and response types

use crate::types::{Document, Outputs};
use serde::{Deserialize, Serialize};

/// Lifecycle operation requested by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

/// A lifecycle event for one custom resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleEvent {
    pub request_type: RequestType,

    /// Resource type, e.g. `Custom::Authn_Application`
    pub resource_type: String,

    #[serde(default)]
    pub resource_properties: Document,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_resource_properties: Option<Document>,

    /// Present on Update and Delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_resource_id: Option<String>,

    #[serde(default)]
    pub stack_id: String,

    #[serde(default)]
    pub request_id: String,

    #[serde(default, rename = "ResponseURL")]
    pub response_url: String,

    #[serde(default)]
    pub logical_resource_id: String,
}

impl LifecycleEvent {
    /// Event for `resource_type` with the given properties
    pub fn new(request_type: RequestType, resource_type: &str, properties: Document) -> Self {
        Self {
            request_type,
            resource_type: resource_type.to_string(),
            resource_properties: properties,
            old_resource_properties: None,
            physical_resource_id: None,
            stack_id: String::new(),
            request_id: String::new(),
            response_url: String::new(),
            logical_resource_id: String::new(),
        }
    }

    pub fn with_physical_id(mut self, physical_id: impl Into<String>) -> Self {
        self.physical_resource_id = Some(physical_id.into());
        self
    }

    pub fn with_old_properties(mut self, properties: Document) -> Self {
        self.old_resource_properties = Some(properties);
        self
    }

    pub fn with_stack_id(mut self, stack_id: impl Into<String>) -> Self {
        self.stack_id = stack_id.into();
        self
    }
}

/// Result of a handled lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LifecycleResponse {
    pub physical_resource_id: String,
    #[serde(default)]
    pub data: Outputs,
}
