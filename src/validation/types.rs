//! Schema types
//!
//! A schema is a tree of [`FieldSpec`]s. Each field declares its kind, an
//! optional coercion function, its canonical (API) name and the constraints
//! checked during validation.

use crate::types::Document;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Coerces a raw value into the field's target representation
pub type CoerceFn = fn(&Value) -> std::result::Result<Value, String>;

/// Computes defaults from a fully normalized document (canonical names)
pub type DefaultsFn = fn(&Document) -> Document;

/// The shape of a field value
#[derive(Debug, Clone)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    /// List whose items optionally follow an item kind
    List(Option<Box<FieldKind>>),
    /// Mapping, either free-form or described by a nested schema
    Dict(Option<Box<Schema>>),
}

impl FieldKind {
    /// List of strings
    pub fn string_list() -> Self {
        FieldKind::List(Some(Box::new(FieldKind::String)))
    }

    /// Name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Boolean => "boolean",
            FieldKind::List(_) => "list",
            FieldKind::Dict(_) => "dict",
        }
    }

    /// Nested schema, if this is a described mapping
    pub fn nested_schema(&self) -> Option<&Schema> {
        match self {
            FieldKind::Dict(Some(schema)) => Some(schema),
            _ => None,
        }
    }
}

/// A condition on a sibling field that must hold for a field to be legal.
///
/// Field names refer to schema keys at the same nesting level.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependency {
    /// The sibling field must be present
    Present(&'static str),
    /// The sibling field must equal one of the values (or, for a list,
    /// contain one of them)
    OneOf {
        field: &'static str,
        values: Vec<Value>,
    },
}

impl Dependency {
    /// Sibling must equal (or contain) one of the given strings
    pub fn one_of(field: &'static str, values: &[&str]) -> Self {
        Dependency::OneOf {
            field,
            values: values.iter().map(|v| Value::from(*v)).collect(),
        }
    }

    /// Check the dependency against the sibling mapping
    pub fn is_satisfied(&self, siblings: &Document) -> bool {
        match self {
            Dependency::Present(field) => siblings.contains_key(*field),
            Dependency::OneOf { field, values } => match siblings.get(*field) {
                Some(Value::Array(items)) => items.iter().any(|item| values.contains(item)),
                Some(value) => values.contains(value),
                None => false,
            },
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dependency::Present(field) => write!(f, "field '{field}' is required"),
            Dependency::OneOf { field, values } => {
                let values: Vec<String> = values.iter().map(render_value).collect();
                write!(f, "depends on these values: {field} in [{}]", values.join(", "))
            }
        }
    }
}

/// One alternative of an `any_of` rule: its dependencies must hold and the
/// value must be within its allow-list.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    pub dependencies: Vec<Dependency>,
    pub allowed: Option<Vec<Value>>,
}

impl Constraint {
    /// Alternative gated on a dependency, restricting values to `allowed`
    pub fn when(dependency: Dependency, allowed: &[&str]) -> Self {
        Self {
            dependencies: vec![dependency],
            allowed: Some(allowed.iter().map(|v| Value::from(*v)).collect()),
        }
    }
}

/// Description of a single schema field
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Key in the normalized input document
    pub name: &'static str,
    pub kind: FieldKind,
    /// Canonical name the value is projected to
    pub rename: Option<&'static str>,
    pub required: bool,
    /// Whether empty strings/lists/mappings are accepted
    pub empty: bool,
    /// Accepted as input, never forwarded
    pub readonly: bool,
    pub allowed: Option<Vec<Value>>,
    pub min: Option<i64>,
    pub max: Option<i64>,
    pub max_length: Option<usize>,
    pub coerce: Option<CoerceFn>,
    pub dependencies: Vec<Dependency>,
    pub any_of: Vec<Constraint>,
    /// Static default, applied when the field is absent
    pub default: Option<Value>,
}

impl FieldSpec {
    /// Create a field of the given kind
    pub fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            rename: None,
            required: false,
            empty: true,
            readonly: false,
            allowed: None,
            min: None,
            max: None,
            max_length: None,
            coerce: None,
            dependencies: Vec::new(),
            any_of: Vec::new(),
            default: None,
        }
    }

    pub fn string(name: &'static str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    /// Untyped list
    pub fn list(name: &'static str) -> Self {
        Self::new(name, FieldKind::List(None))
    }

    pub fn string_list(name: &'static str) -> Self {
        Self::new(name, FieldKind::string_list())
    }

    /// Free-form mapping
    pub fn dict(name: &'static str) -> Self {
        Self::new(name, FieldKind::Dict(None))
    }

    /// Mapping described by a nested schema
    pub fn object(name: &'static str, schema: Schema) -> Self {
        Self::new(name, FieldKind::Dict(Some(Box::new(schema))))
    }

    #[must_use]
    pub fn rename(mut self, canonical: &'static str) -> Self {
        self.rename = Some(canonical);
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn non_empty(mut self) -> Self {
        self.empty = false;
        self
    }

    #[must_use]
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    #[must_use]
    pub fn allowed(mut self, values: &[&str]) -> Self {
        self.allowed = Some(values.iter().map(|v| Value::from(*v)).collect());
        self
    }

    #[must_use]
    pub fn min(mut self, min: i64) -> Self {
        self.min = Some(min);
        self
    }

    #[must_use]
    pub fn max(mut self, max: i64) -> Self {
        self.max = Some(max);
        self
    }

    #[must_use]
    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    #[must_use]
    pub fn coerce(mut self, coerce: CoerceFn) -> Self {
        self.coerce = Some(coerce);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    #[must_use]
    pub fn any_of(mut self, constraints: Vec<Constraint>) -> Self {
        self.any_of = constraints;
        self
    }

    #[must_use]
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Name the validated value is stored under
    pub fn canonical_name(&self) -> &'static str {
        self.rename.unwrap_or(self.name)
    }
}

/// A declarative document schema
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: BTreeMap<&'static str, FieldSpec>,
    normalize_keys: bool,
    defaults: Option<DefaultsFn>,
}

impl Schema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field
    #[must_use]
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.insert(spec.name, spec);
        self
    }

    /// Convert input keys to snake case before validating
    #[must_use]
    pub fn normalize_keys(mut self) -> Self {
        self.normalize_keys = true;
        self
    }

    /// Install a defaults hook
    #[must_use]
    pub fn with_defaults(mut self, defaults: DefaultsFn) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Get a field by its input name
    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.get(name)
    }

    /// Find the field whose canonical name is `canonical` but whose input
    /// name differs
    pub fn find_renamed(&self, canonical: &str) -> Option<&FieldSpec> {
        self.fields
            .values()
            .find(|spec| spec.rename == Some(canonical) && spec.name != canonical)
    }

    /// Whether a key is declared
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate over the fields in name order
    pub fn fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.values()
    }

    pub fn normalizes_keys(&self) -> bool {
        self.normalize_keys
    }

    pub fn defaults(&self) -> Option<DefaultsFn> {
        self.defaults
    }
}

/// Field-indexed validation failures.
///
/// Nested fields use dotted paths (`refresh_token.token_lifetime`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a reason for a field
    pub fn add(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(reason.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Reasons recorded for a field
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, reasons)| format!("{field}: {}", reasons.join(", ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Render a value for an error message (strings without quotes)
pub(crate) fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
