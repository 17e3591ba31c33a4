//! Application (client) schema

use crate::types::Document;
use crate::validation::{
    lookup, to_boolean, to_integer, Constraint, Dependency, FieldKind, FieldSpec, Schema,
};
use serde_json::{json, Value};
use std::sync::LazyLock;

/// External application type to API `app_type`
pub const APP_TYPE_MAP: &[(&str, &str)] = &[
    ("spa", "spa"),
    ("native", "native"),
    ("m2m", "non_interactive"),
    ("web", "regular_web"),
];

/// External auth method to API `token_endpoint_auth_method`
pub const AUTH_METHOD_MAP: &[(&str, &str)] = &[
    ("None", "none"),
    ("Post", "client_secret_post"),
    ("Basic", "client_secret_basic"),
];

const INTERACTIVE_TYPES: &[&str] = &["spa", "native", "regular_web"];

const INTERACTIVE_GRANTS: &[&str] = &[
    "implicit",
    "authorization_code",
    "refresh_token",
    "password",
    "mfa",
];

const M2M_GRANTS: &[&str] = &[
    "client_credentials",
    "implicit",
    "authorization_code",
    "refresh_token",
    "password",
    "mfa",
];

fn to_app_type(value: &Value) -> Result<Value, String> {
    lookup(APP_TYPE_MAP, value, "type")
}

fn to_auth_method(value: &Value) -> Result<Value, String> {
    lookup(AUTH_METHOD_MAP, value, "method")
}

/// Grant type and auth method defaults keyed on the coerced `app_type`
pub fn application_defaults(document: &Document) -> Document {
    let defaults = match document.get("app_type").and_then(Value::as_str) {
        Some("non_interactive") => json!({
            "grant_types": ["client_credentials"],
            "token_endpoint_auth_method": "client_secret_post",
        }),
        Some("spa") => json!({
            "grant_types": ["implicit", "authorization_code", "refresh_token"],
            "token_endpoint_auth_method": "none",
        }),
        _ => return Document::new(),
    };
    crate::types::document_from(defaults)
}

fn jwt_configuration() -> Schema {
    Schema::new()
        .field(
            FieldSpec::integer("lifetime_in_seconds")
                .coerce(to_integer)
                .default_value(json!(3600)),
        )
        .field(FieldSpec::dict("scopes"))
        .field(FieldSpec::string("alg"))
}

fn refresh_token() -> Schema {
    Schema::new()
        .field(FieldSpec::string("rotation_type").allowed(&["rotating", "non-rotating"]))
        .field(FieldSpec::string("expiration_type").allowed(&["expiring", "non-expiring"]))
        .field(
            FieldSpec::integer("token_lifetime")
                .coerce(to_integer)
                .min(1800)
                .max(2_592_000),
        )
}

fn mobile() -> Schema {
    Schema::new()
        .field(FieldSpec::object(
            "android",
            Schema::new()
                .field(FieldSpec::string("app_package_name"))
                .field(FieldSpec::list("sha256_cert_fingerprints")),
        ))
        .field(FieldSpec::object(
            "ios",
            Schema::new()
                .field(FieldSpec::string("team_id"))
                .field(FieldSpec::string("app_bundle_identifier")),
        ))
}

/// Application properties
pub static APPLICATION_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .normalize_keys()
        .field(FieldSpec::string("tenant").readonly().non_empty())
        .field(FieldSpec::string("service_token").readonly().non_empty())
        .field(FieldSpec::string("name").required().non_empty())
        .field(FieldSpec::string("description").required().non_empty())
        .field(FieldSpec::string("logo_uri"))
        .field(
            FieldSpec::string("type")
                .rename("app_type")
                .required()
                .allowed(&["spa", "native", "non_interactive", "regular_web"])
                .coerce(to_app_type),
        )
        .field(
            FieldSpec::string("token_endpoint_auth_method")
                .allowed(&["none", "client_secret_post", "client_secret_basic"])
                .coerce(to_auth_method),
        )
        .field(
            FieldSpec::string("auth_method")
                .rename("token_endpoint_auth_method")
                .allowed(&["none", "client_secret_post", "client_secret_basic"])
                .coerce(to_auth_method),
        )
        .field(FieldSpec::string("login_u_r_i").rename("initiate_login_uri"))
        .field(FieldSpec::string_list("callback_urls").rename("callbacks"))
        .field(FieldSpec::string_list("logout_urls").rename("allowed_logout_urls"))
        .field(FieldSpec::string_list("web_origins"))
        .field(FieldSpec::string_list("allowed_origins"))
        .field(FieldSpec::object("j_w_t_configuration", jwt_configuration()).rename("jwt_configuration"))
        .field(FieldSpec::object("refresh_token", refresh_token()).depends_on(Dependency::Present("grant_types")))
        .field(
            FieldSpec::object(
                "native_social_login",
                Schema::new()
                    .field(FieldSpec::dict("apple"))
                    .field(FieldSpec::dict("facebook")),
            )
            .depends_on(Dependency::one_of("type", &["native"])),
        )
        .field(FieldSpec::dict("client_metadata").default_value(json!({})))
        .field(FieldSpec::object("mobile", mobile()))
        .field(FieldSpec::list("allowed_clients"))
        .field(FieldSpec::boolean("oidc_conformant").coerce(to_boolean))
        .field(FieldSpec::string_list("grant_types").any_of(vec![
            Constraint::when(Dependency::one_of("type", &["non_interactive"]), M2M_GRANTS),
            Constraint::when(Dependency::one_of("type", INTERACTIVE_TYPES), INTERACTIVE_GRANTS),
        ]))
        .field(
            FieldSpec::new("allow_ad_groups", FieldKind::string_list())
                .readonly()
                .depends_on(Dependency::one_of("type", INTERACTIVE_TYPES)),
        )
        .field(FieldSpec::string_list("connections").readonly())
        .with_defaults(application_defaults)
});
