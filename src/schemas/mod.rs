//! Resource schemas
//!
//! One schema per resource kind plus the tag schema used to build client
//! metadata from stack tags. Schemas are built once and shared.

mod api;
mod application;
mod grant;
mod tags;

pub use api::API_SCHEMA;
pub use application::{application_defaults, APPLICATION_SCHEMA, APP_TYPE_MAP, AUTH_METHOD_MAP};
pub use grant::GRANT_SCHEMA;
pub use tags::TAG_SCHEMA;

use crate::types::ResourceKind;
use crate::validation::Schema;

/// Schema validating the properties of a resource kind
pub fn for_kind(kind: ResourceKind) -> &'static Schema {
    match kind {
        ResourceKind::Application => &APPLICATION_SCHEMA,
        ResourceKind::Api => &API_SCHEMA,
        ResourceKind::Grant => &GRANT_SCHEMA,
    }
}
