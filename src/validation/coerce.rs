//! Coercion functions referenced by schema fields
//!
//! Every coercion accepts values that are already in canonical form, so
//! coercing twice yields the same value.

use serde_json::Value;

/// Cast to an integer (`"86400"` -> `86400`)
pub fn to_integer(value: &Value) -> Result<Value, String> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => Ok(Value::from(f as i64)),
            _ => Err(format!("invalid literal for int(): {n}")),
        },
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| format!("invalid literal for int(): '{s}'")),
        Value::Bool(b) => Ok(Value::from(i64::from(*b))),
        other => Err(format!("cannot convert {other} to int")),
    }
}

/// Permissive boolean: literal `true`, `"true"` and `"True"` are true,
/// anything else is false
pub fn to_boolean(value: &Value) -> Result<Value, String> {
    Ok(Value::Bool(match value {
        Value::Bool(b) => *b,
        Value::String(s) => s == "true" || s == "True",
        _ => false,
    }))
}

/// Encode lists and mappings as compact JSON strings; scalars pass through
pub fn to_compact_json(value: &Value) -> Result<Value, String> {
    match value {
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value)
            .map(Value::String)
            .map_err(|e| e.to_string()),
        other => Ok(other.clone()),
    }
}

/// Map a value through an `(external, canonical)` table. Canonical values
/// map to themselves.
pub fn lookup(table: &[(&str, &str)], value: &Value, label: &str) -> Result<Value, String> {
    let expected = || {
        let names: Vec<&str> = table.iter().map(|(external, _)| *external).collect();
        format!("{label} should be one of {}", names.join(","))
    };
    let raw = value.as_str().ok_or_else(expected)?;
    table
        .iter()
        .find(|(external, canonical)| *external == raw || *canonical == raw)
        .map(|(_, canonical)| Value::from(*canonical))
        .ok_or_else(expected)
}
