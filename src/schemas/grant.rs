//! Client grant schema

use crate::validation::{FieldSpec, Schema};
use std::sync::LazyLock;

/// Grant properties
pub static GRANT_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .normalize_keys()
        .field(FieldSpec::string("tenant").readonly().non_empty())
        .field(FieldSpec::string("service_token").readonly())
        .field(FieldSpec::string("application_id").required().non_empty())
        .field(FieldSpec::string("audience").required().non_empty())
        .field(FieldSpec::string_list("scope"))
});
