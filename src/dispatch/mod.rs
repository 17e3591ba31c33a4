//! Lifecycle dispatch
//!
//! Routes a lifecycle event to the reconciler for its resource type, keeps
//! the physical resource id stable across Update and Delete, and watches the
//! stack after a create.

mod event;
mod poll;

pub use event::{LifecycleEvent, LifecycleResponse, RequestType};
pub use poll::{stack_is_failing, watch_create};

use crate::error::{Error, Result};
use crate::reconcile::{reconciler_for, ReconcileContext, Reconciler, Services};
use crate::types::{Document, JsonValue, ResourceKind};
use std::sync::Arc;
use tracing::{error, info, warn};

const ALLOW_AD_GROUPS: &str = "AllowAdGroups";

/// Entry point for lifecycle events
pub struct LifecycleDispatcher {
    services: Arc<Services>,
}

impl LifecycleDispatcher {
    pub fn new(services: Arc<Services>) -> Self {
        Self { services }
    }

    /// Handle one lifecycle event
    pub async fn handle(&self, event: &LifecycleEvent) -> Result<LifecycleResponse> {
        let kind = resolve_kind(&event.resource_type)?;
        let reconciler = reconciler_for(kind, self.services.clone());
        let props = &event.resource_properties;
        info!(
            request_type = ?event.request_type,
            resource_type = %event.resource_type,
            logical_id = %event.logical_resource_id,
            "Handling lifecycle event"
        );

        match event.request_type {
            RequestType::Create => {
                let mut ctx = self.context(event).await?;
                let physical_id = reconciler.create(props, &mut ctx).await?;
                if kind != ResourceKind::Grant {
                    self.teardown_if_failing(reconciler.as_ref(), event, &physical_id)
                        .await;
                }
                Ok(LifecycleResponse {
                    physical_resource_id: physical_id,
                    data: ctx.outputs,
                })
            }
            RequestType::Update => {
                let physical_id = physical_id(event)?;
                let old_props = event.old_resource_properties.clone().unwrap_or_default();
                let mut ctx = self.context(event).await?;
                let physical_id = reconciler
                    .update(physical_id, props, &old_props, &mut ctx)
                    .await?;
                Ok(LifecycleResponse {
                    physical_resource_id: physical_id,
                    data: ctx.outputs,
                })
            }
            RequestType::Delete => {
                let physical_id = physical_id(event)?;
                reconciler.delete(physical_id, props).await?;
                Ok(LifecycleResponse {
                    physical_resource_id: physical_id.to_string(),
                    data: Default::default(),
                })
            }
        }
    }

    /// Reconcile context carrying the stack tags
    async fn context(&self, event: &LifecycleEvent) -> Result<ReconcileContext> {
        let stack_tags = self.services.stacks.stack_tags(&event.stack_id).await?;

        let mut tags: Document = stack_tags
            .iter()
            .map(|tag| (tag.key.clone(), JsonValue::String(tag.value.clone())))
            .collect();
        if let Some(groups) = event
            .resource_properties
            .get(ALLOW_AD_GROUPS)
            .filter(|groups| is_truthy(groups))
        {
            tags.insert(ALLOW_AD_GROUPS.to_string(), groups.clone());
        }

        Ok(ReconcileContext {
            tags,
            stack_tags,
            ..ReconcileContext::default()
        })
    }

    /// Delete a freshly created resource when its stack is failing. Errors
    /// are logged, the create response stands either way.
    async fn teardown_if_failing(
        &self,
        reconciler: &dyn Reconciler,
        event: &LifecycleEvent,
        physical_id: &str,
    ) {
        let settings = &self.services.settings;
        let failing =
            match watch_create(self.services.stacks.as_ref(), settings, &event.stack_id).await {
                Ok(failing) => failing,
                Err(err) => {
                    error!(stack_id = %event.stack_id, error = %err, "Failed to inspect stack events");
                    return;
                }
            };
        if !failing {
            return;
        }

        warn!(physical_id, "Stack is in failing state, tearing down resource");
        if let Err(err) = reconciler.delete(physical_id, &event.resource_properties).await {
            error!(physical_id, error = %err, "Failed to tear down resource");
        }
    }
}

fn resolve_kind(resource_type: &str) -> Result<ResourceKind> {
    ResourceKind::from_resource_type(resource_type).ok_or_else(|| {
        Error::UnknownResourceType {
            resource_type: resource_type
                .rsplit(':')
                .next()
                .unwrap_or(resource_type)
                .to_string(),
            known: ResourceKind::ALL
                .iter()
                .map(|kind| kind.type_tag())
                .collect::<Vec<_>>()
                .join(","),
        }
    })
}

fn physical_id(event: &LifecycleEvent) -> Result<&str> {
    event
        .physical_resource_id
        .as_deref()
        .ok_or_else(|| Error::missing_field("PhysicalResourceId"))
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(flag) => *flag,
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(items) => !items.is_empty(),
        JsonValue::Object(map) => !map.is_empty(),
        JsonValue::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
    }
}
