//! Identity provider module
//!
//! The verbs the reconcilers need from the identity management API, behind
//! the [`IdentityProvider`] trait, and the Auth0 management API client that
//! implements them.
//!
//! # Overview
//!
//! Reconcilers never talk HTTP themselves. They receive a provider for the
//! tenant named in the resource properties from a [`ProviderFactory`], so
//! the real client and the in-memory fakes in [`crate::testing`] are
//! interchangeable.

mod auth0;
mod pagination;

pub use auth0::{Auth0Client, Auth0ProviderFactory, ManagementCredentials};
pub use pagination::{find_resource_server, PageScan, ScanState, PAGE_LIMIT, PAGE_SIZE};

use crate::error::Result;
use crate::types::Document;
use async_trait::async_trait;
use std::sync::Arc;

/// Credentials returned when an application is created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedApplication {
    pub client_id: String,
    pub client_secret: String,
}

/// Verbs against the identity management API
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an application (client) from a validated document
    async fn create_application(&self, fields: &Document) -> Result<CreatedApplication>;

    /// Update an application, returning its client id
    async fn update_application(&self, client_id: &str, fields: &Document) -> Result<String>;

    async fn delete_application(&self, client_id: &str) -> Result<()>;

    /// Create an API (resource server), returning its id
    async fn create_api(&self, fields: &Document) -> Result<String>;

    async fn update_api(&self, api_id: &str, fields: &Document) -> Result<()>;

    async fn delete_api(&self, api_id: &str) -> Result<()>;

    /// Create a client grant, returning its id
    async fn create_grant(&self, fields: &Document) -> Result<String>;

    async fn delete_grant(&self, grant_id: &str) -> Result<()>;

    /// Enable an application on a connection
    async fn add_to_connection(&self, connection_id: &str, client_id: &str) -> Result<()>;

    /// Disable an application on a connection
    async fn remove_from_connection(&self, connection_id: &str, client_id: &str) -> Result<()>;

    /// Issue a new client secret, returning it
    async fn rotate_client_secret(&self, client_id: &str) -> Result<String>;

    /// Read selected fields of an application
    async fn get_application(&self, client_id: &str, fields: &[&str]) -> Result<Document>;

    /// One page of resource servers (pages start at 0)
    async fn list_resource_servers(&self, page: u32, per_page: u32) -> Result<Vec<Document>>;
}

/// Builds an authenticated provider for a tenant
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    async fn provider(&self, tenant: &str) -> Result<Arc<dyn IdentityProvider>>;
}
