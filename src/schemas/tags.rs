//! Stack tag schema
//!
//! Only allow-listed tags reach client metadata. Keys keep their original
//! casing.

use crate::validation::{to_compact_json, FieldSpec, Schema};
use std::sync::LazyLock;

/// Client metadata values are capped by the identity platform
pub const METADATA_VALUE_MAX_LENGTH: usize = 255;

/// Tags copied into client metadata
pub static TAG_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .field(FieldSpec::string("ApplicationID"))
        .field(
            FieldSpec::string("AllowAdGroups")
                .coerce(to_compact_json)
                .max_length(METADATA_VALUE_MAX_LENGTH),
        )
});
