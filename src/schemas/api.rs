//! Api (resource server) schema

use crate::validation::{to_boolean, to_integer, FieldSpec, Schema};
use std::sync::LazyLock;

/// Api properties. Grants are managed through the grant resource, so
/// `client` is not accepted here.
pub static API_SCHEMA: LazyLock<Schema> = LazyLock::new(|| {
    Schema::new()
        .normalize_keys()
        .field(FieldSpec::string("tenant").readonly().non_empty())
        .field(FieldSpec::string("service_token").readonly())
        .field(FieldSpec::string("name"))
        .field(FieldSpec::string("audience").rename("identifier").required())
        .field(FieldSpec::string_list("scopes"))
        .field(FieldSpec::string("signing_alg").allowed(&["HS256", "RS256"]))
        .field(FieldSpec::string("signing_secret"))
        .field(FieldSpec::boolean("allow_offline_access").coerce(to_boolean))
        .field(FieldSpec::integer("token_lifetime").coerce(to_integer))
        .field(FieldSpec::string("token_dialect").allowed(&["access_token", "access_token_authz"]))
        .field(
            FieldSpec::boolean("skip_consent_for_verifiable_first_party_clients")
                .coerce(to_boolean),
        )
        .field(FieldSpec::boolean("enforce_policies").coerce(to_boolean))
});
