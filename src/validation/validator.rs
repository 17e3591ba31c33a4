//! Schema-driven document normalization
//!
//! `validate` runs, in order: key normalization, alias resolution,
//! read-only purge, coercion, validation (which also purges unknown fields),
//! projection onto canonical names with static defaults, and finally the
//! schema's defaults hook. The result is a pure function of the raw
//! document and the schema.

use super::casing::{convert_keys, snake_case};
use super::types::{Constraint, FieldKind, FieldSpec, Schema, ValidationErrors};
use crate::types::Document;
use serde_json::Value;
use tracing::warn;

/// Validate a document, applying the schema's defaults hook
pub fn validate(raw: &Document, schema: &Schema) -> Result<Document, ValidationErrors> {
    validate_with(raw, schema, true)
}

/// Validate a document, optionally skipping the defaults hook
pub fn validate_with(
    raw: &Document,
    schema: &Schema,
    apply_defaults: bool,
) -> Result<Document, ValidationErrors> {
    let mut document = if schema.normalizes_keys() {
        normalize_keys(raw)
    } else {
        raw.clone()
    };
    resolve_aliases(&mut document, schema);

    document.retain(|key, _| !schema.get(key).is_some_and(|spec| spec.readonly));

    let mut errors = ValidationErrors::new();
    coerce_mapping(&mut document, schema, "", &mut errors);
    validate_mapping(&mut document, schema, "", &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    let mut validated = project(document, schema);
    if apply_defaults {
        if let Some(defaults) = schema.defaults() {
            for (key, value) in defaults(&validated) {
                validated.entry(key).or_insert(value);
            }
        }
    }
    Ok(validated)
}

/// Convert every key, at any depth, to snake case
pub fn normalize_keys(raw: &Document) -> Document {
    raw.iter()
        .map(|(key, value)| (snake_case(key), convert_keys(value, snake_case)))
        .collect()
}

fn field_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

// ============================================================================
// Alias resolution
// ============================================================================

/// Accept canonical names as input: a key that is not declared but is the
/// rename target of a declared field is moved to that field's input name.
fn resolve_aliases(document: &mut Document, schema: &Schema) {
    let keys: Vec<String> = document.keys().cloned().collect();
    for key in keys {
        if schema.contains(&key) {
            continue;
        }
        if let Some(spec) = schema.find_renamed(&key) {
            if !document.contains_key(spec.name) {
                if let Some(value) = document.remove(&key) {
                    document.insert(spec.name.to_string(), value);
                }
            }
        }
    }

    for spec in schema.fields() {
        if let Some(value) = document.get_mut(spec.name) {
            resolve_value_aliases(value, &spec.kind);
        }
    }
}

fn resolve_value_aliases(value: &mut Value, kind: &FieldKind) {
    match (kind, value) {
        (FieldKind::Dict(Some(schema)), Value::Object(map)) => resolve_aliases(map, schema),
        (FieldKind::List(Some(item)), Value::Array(items)) => {
            for item_value in items {
                resolve_value_aliases(item_value, item);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Coercion
// ============================================================================

fn coerce_mapping(document: &mut Document, schema: &Schema, path: &str, errors: &mut ValidationErrors) {
    for spec in schema.fields() {
        let Some(value) = document.get_mut(spec.name) else {
            continue;
        };
        let field = field_path(path, spec.name);
        if let Some(coerce) = spec.coerce {
            match coerce(value) {
                Ok(coerced) => *value = coerced,
                Err(reason) => errors.add(
                    &field,
                    format!("field '{}' cannot be coerced: {reason}", spec.name),
                ),
            }
        }
        coerce_nested(value, &spec.kind, &field, errors);
    }
}

fn coerce_nested(value: &mut Value, kind: &FieldKind, path: &str, errors: &mut ValidationErrors) {
    match (kind, value) {
        (FieldKind::Dict(Some(schema)), Value::Object(map)) => {
            coerce_mapping(map, schema, path, errors);
        }
        (FieldKind::List(Some(item)), Value::Array(items)) => {
            for (index, item_value) in items.iter_mut().enumerate() {
                coerce_nested(item_value, item, &format!("{path}.{index}"), errors);
            }
        }
        _ => {}
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_mapping(
    document: &mut Document,
    schema: &Schema,
    path: &str,
    errors: &mut ValidationErrors,
) {
    // Unknown fields never reach the downstream API
    document.retain(|key, _| schema.contains(key));
    let siblings = document.clone();

    for spec in schema.fields() {
        let field = field_path(path, spec.name);
        if !document.contains_key(spec.name) {
            if spec.required {
                errors.add(field, "required field");
            }
            continue;
        }

        if let Some(unmet) = spec
            .dependencies
            .iter()
            .find(|dependency| !dependency.is_satisfied(&siblings))
        {
            if spec.required {
                errors.add(field, unmet.to_string());
            } else {
                warn!(field = %field, reason = %unmet, "Dropping field with unmet dependency");
                document.remove(spec.name);
            }
            continue;
        }

        if let Some(value) = document.get_mut(spec.name) {
            validate_value(value, spec, &siblings, &field, errors);
        }
    }
}

fn validate_value(
    value: &mut Value,
    spec: &FieldSpec,
    siblings: &Document,
    path: &str,
    errors: &mut ValidationErrors,
) {
    if value.is_null() {
        errors.add(path, "null value not allowed");
        return;
    }
    if !check_kind(value, &spec.kind, path, errors) {
        return;
    }

    if !spec.empty && is_empty(value) {
        errors.add(path, "empty values not allowed");
    }

    if let Some(allowed) = &spec.allowed {
        check_allowed(value, allowed, path, errors);
    }

    if let Some(number) = value.as_i64() {
        if let Some(min) = spec.min.filter(|min| number < *min) {
            errors.add(path, format!("min value is {min}"));
        }
        if let Some(max) = spec.max.filter(|max| number > *max) {
            errors.add(path, format!("max value is {max}"));
        }
    }

    if let Some(max_length) = spec.max_length {
        let length = match &*value {
            Value::String(s) => s.chars().count(),
            Value::Array(items) => items.len(),
            _ => 0,
        };
        if length > max_length {
            errors.add(path, format!("max length is {max_length}"));
        }
    }

    if !spec.any_of.is_empty()
        && !spec
            .any_of
            .iter()
            .any(|constraint| constraint_matches(constraint, value, siblings))
    {
        errors.add(path, "no definitions validate");
    }

    match (&spec.kind, value) {
        (FieldKind::Dict(Some(schema)), Value::Object(map)) => {
            validate_mapping(map, schema, path, errors);
        }
        (FieldKind::List(Some(item)), Value::Array(items)) => {
            if let Some(schema) = item.nested_schema() {
                for (index, item_value) in items.iter_mut().enumerate() {
                    if let Value::Object(map) = item_value {
                        validate_mapping(map, schema, &format!("{path}.{index}"), errors);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Type-check a value; list items are checked element-wise
fn check_kind(value: &Value, kind: &FieldKind, path: &str, errors: &mut ValidationErrors) -> bool {
    let matches = match kind {
        FieldKind::String => value.is_string(),
        FieldKind::Integer => value.is_i64() || value.is_u64(),
        FieldKind::Boolean => value.is_boolean(),
        FieldKind::List(_) => value.is_array(),
        FieldKind::Dict(_) => value.is_object(),
    };
    if !matches {
        errors.add(path, format!("must be of {} type", kind.type_name()));
        return false;
    }

    if let (FieldKind::List(Some(item)), Value::Array(items)) = (kind, value) {
        let mut all_match = true;
        for (index, item_value) in items.iter().enumerate() {
            if !check_kind(item_value, item, &format!("{path}.{index}"), errors) {
                all_match = false;
            }
        }
        return all_match;
    }
    true
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn check_allowed(value: &Value, allowed: &[Value], path: &str, errors: &mut ValidationErrors) {
    match value {
        Value::Array(items) => {
            let unallowed: Vec<String> = items
                .iter()
                .filter(|item| !allowed.contains(item))
                .map(super::types::render_value)
                .collect();
            if !unallowed.is_empty() {
                errors.add(path, format!("unallowed values [{}]", unallowed.join(", ")));
            }
        }
        other => {
            if !allowed.contains(other) {
                errors.add(
                    path,
                    format!("unallowed value {}", super::types::render_value(other)),
                );
            }
        }
    }
}

fn constraint_matches(constraint: &Constraint, value: &Value, siblings: &Document) -> bool {
    if !constraint
        .dependencies
        .iter()
        .all(|dependency| dependency.is_satisfied(siblings))
    {
        return false;
    }
    match (&constraint.allowed, value) {
        (None, _) => true,
        (Some(allowed), Value::Array(items)) => items.iter().all(|item| allowed.contains(item)),
        (Some(allowed), other) => allowed.contains(other),
    }
}

// ============================================================================
// Projection
// ============================================================================

/// Move values to their canonical names and fill static defaults.
///
/// A field declared under its canonical name wins over a renamed field
/// projecting onto the same name.
fn project(document: Document, schema: &Schema) -> Document {
    let mut projected = Document::new();
    let mut renamed = Vec::new();

    for (key, value) in document {
        let Some(spec) = schema.get(&key) else {
            continue;
        };
        let value = project_value(value, &spec.kind);
        match spec.rename {
            Some(canonical) if canonical != spec.name => renamed.push((canonical, value)),
            _ => {
                projected.insert(key, value);
            }
        }
    }
    for (canonical, value) in renamed {
        projected.entry(canonical).or_insert(value);
    }

    for spec in schema.fields() {
        if let Some(default) = &spec.default {
            projected
                .entry(spec.canonical_name())
                .or_insert_with(|| default.clone());
        }
    }
    projected
}

fn project_value(value: Value, kind: &FieldKind) -> Value {
    match (kind, value) {
        (FieldKind::Dict(Some(schema)), Value::Object(map)) => Value::Object(project(map, schema)),
        (FieldKind::List(Some(item)), Value::Array(items)) => Value::Array(
            items
                .into_iter()
                .map(|item_value| project_value(item_value, item))
                .collect(),
        ),
        (_, other) => other,
    }
}
