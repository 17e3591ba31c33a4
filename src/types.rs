//! Common types used throughout the custom resource
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// A key-value document (resource properties, API payloads)
pub type Document = serde_json::Map<String, JsonValue>;

/// Output attributes returned with a lifecycle response
pub type Outputs = BTreeMap<String, String>;

/// Build a document from a JSON value, yielding an empty document for
/// anything that is not an object
pub fn document_from(value: JsonValue) -> Document {
    match value {
        JsonValue::Object(map) => map,
        _ => Document::new(),
    }
}

// ============================================================================
// Resource Kinds
// ============================================================================

/// The resource kinds handled by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Application,
    Api,
    Grant,
}

impl ResourceKind {
    /// All kinds, in dispatch table order
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Application,
        ResourceKind::Api,
        ResourceKind::Grant,
    ];

    /// The resource type tag (last segment of `Custom::Authn_Application`)
    pub fn type_tag(self) -> &'static str {
        match self {
            ResourceKind::Application => "Authn_Application",
            ResourceKind::Api => "Authn_Api",
            ResourceKind::Grant => "Authn_Grant",
        }
    }

    /// Resolve a resource type string such as `Custom::Authn_Api`
    pub fn from_resource_type(resource_type: &str) -> Option<Self> {
        let tag = resource_type.rsplit(':').next().unwrap_or(resource_type);
        Self::ALL.into_iter().find(|kind| kind.type_tag() == tag)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Application => write!(f, "application"),
            ResourceKind::Api => write!(f, "api"),
            ResourceKind::Grant => write!(f, "grant"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "application" => Ok(ResourceKind::Application),
            "api" => Ok(ResourceKind::Api),
            "grant" => Ok(ResourceKind::Grant),
            other => Err(format!("unknown resource kind: {other}")),
        }
    }
}

// ============================================================================
// Stack Tags
// ============================================================================

/// A tag attached to the enclosing stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StackTag {
    pub key: String,
    pub value: String,
}

impl StackTag {
    /// Create a new tag
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

// ============================================================================
// Backoff Types
// ============================================================================

/// Backoff strategy for retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffType {
    /// Constant delay between retries
    Constant,
    /// Linear increase in delay
    Linear,
    /// Exponential increase in delay
    #[default]
    Exponential,
}
