//! Key casing conversions
//!
//! Resource properties arrive in PascalCase (`CallbackUrls`, `JWTConfiguration`)
//! while the schemas are declared in snake case. Every uppercase letter
//! starts a new word, so acronyms split per letter (`LoginURI` becomes
//! `login_u_r_i`).

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::LazyLock;

/// Separators that become underscores
static SEPARATOR_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[\-\.\s]").unwrap());

/// A single uppercase ASCII letter
static UPPER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[A-Z]").unwrap());

/// Convert a key to snake case
pub fn snake_case(input: &str) -> String {
    let replaced = SEPARATOR_REGEX.replace_all(input, "_");
    let mut chars = replaced.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest: String = chars.collect();
    let rest = UPPER_REGEX.replace_all(&rest, |caps: &Captures| {
        format!("_{}", caps[0].to_lowercase())
    });
    format!("{}{rest}", first.to_lowercase())
}

/// Convert a snake case key to PascalCase
pub fn pascal_case(input: &str) -> String {
    input
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

/// Keep only alphanumeric characters, lowercased
pub fn alphanumeric_lowercase(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Recursively rewrite every mapping key, descending into lists
pub fn convert_keys(value: &Value, convert: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (convert(key), convert_keys(value, convert)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| convert_keys(item, convert)).collect())
        }
        other => other.clone(),
    }
}
