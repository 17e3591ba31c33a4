//! Declarative document validation
//!
//! Resource properties are normalized against a [`Schema`]:
//!
//! - **Key normalization**: PascalCase keys become snake case
//! - **Coercion**: strings become integers, aliases map to API values
//! - **Validation**: required, type, allow-list, range and dependency rules
//! - **Projection**: fields move to their API names, defaults are filled

mod casing;
mod coerce;
mod types;
mod validator;

pub use casing::{alphanumeric_lowercase, convert_keys, pascal_case, snake_case};
pub use coerce::{lookup, to_boolean, to_compact_json, to_integer};
pub use types::{
    CoerceFn, Constraint, DefaultsFn, Dependency, FieldKind, FieldSpec, Schema, ValidationErrors,
};
pub use validator::{normalize_keys, validate, validate_with};
