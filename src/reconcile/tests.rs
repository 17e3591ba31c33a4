//! Reconciler tests against the in-memory collaborators

use super::*;
use crate::error::Error;
use crate::testing::{
    MemoryParameterStore, MemorySecretStore, ProviderCall, ProviderOp, RecordingProvider,
    SecretOp, StaticProviderFactory, StaticStack,
};
use crate::types::document_from;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

struct Harness {
    provider: Arc<RecordingProvider>,
    secrets: Arc<MemorySecretStore>,
    parameters: Arc<MemoryParameterStore>,
    services: Arc<Services>,
}

impl Harness {
    fn new() -> Self {
        let provider = Arc::new(RecordingProvider::new());
        let secrets = Arc::new(MemorySecretStore::new());
        let parameters = Arc::new(MemoryParameterStore::new());
        let settings = Settings {
            environ: "qa".to_string(),
            kms_key_id: Some("baz_key".to_string()),
            rotation: Some("arn:aws:lambda:us-east-1:000000000000:function:rotate".to_string()),
            page_delay_ms: 0,
            ..Settings::default()
        };
        let services = Arc::new(Services {
            settings,
            providers: Arc::new(StaticProviderFactory::new(provider.clone())),
            secrets: secrets.clone(),
            parameters: parameters.clone(),
            stacks: Arc::new(StaticStack::default()),
        });
        Self {
            provider,
            secrets,
            parameters,
            services,
        }
    }

    fn application(&self) -> ApplicationReconciler {
        ApplicationReconciler::new(self.services.clone())
    }

    fn api(&self) -> ApiReconciler {
        ApiReconciler::new(self.services.clone())
    }

    fn grant(&self) -> GrantReconciler {
        GrantReconciler::new(self.services.clone())
    }
}

fn props(value: Value) -> Document {
    document_from(value)
}

fn app_props(app_type: &str) -> Document {
    props(json!({
        "ServiceToken": "arn:aws:lambda:us-east-1:000000000000:function:cr",
        "Tenant": "foo.com",
        "Type": app_type,
        "Name": "cr-unittest",
        "Description": "test"
    }))
}

fn with(mut base: Document, key: &str, value: Value) -> Document {
    base.insert(key.to_string(), value);
    base
}

fn m2m_secret(client_id: &str) -> String {
    json!({"client_id": client_id, "client_secret": "old", "tenant": "foo.com"}).to_string()
}

// ============================================================================
// Application
// ============================================================================

#[tokio::test]
async fn test_create_m2m_application() {
    let harness = Harness::new();
    let mut ctx = ReconcileContext {
        stack_tags: vec![StackTag::new("TeamName", "identity")],
        ..ReconcileContext::default()
    };

    let physical_id = harness
        .application()
        .create(&app_props("m2m"), &mut ctx)
        .await
        .unwrap();

    assert_eq!(physical_id, "/qa/auth0/crunittest");
    let stored: Value =
        serde_json::from_str(&harness.secrets.value(&physical_id, "AWSCURRENT").unwrap()).unwrap();
    assert_eq!(
        stored,
        json!({"client_id": "client_1", "client_secret": "client_1_secret", "tenant": "foo.com"})
    );
    assert_eq!(
        harness.secrets.rotation(&physical_id),
        Some((
            "arn:aws:lambda:us-east-1:000000000000:function:rotate".to_string(),
            30
        ))
    );
    assert_eq!(harness.secrets.kms_key_id(&physical_id).as_deref(), Some("baz_key"));
    assert_eq!(
        harness.secrets.tags(&physical_id),
        vec![StackTag::new("TeamName", "identity")]
    );
    assert_eq!(ctx.outputs.get("Name").map(String::as_str), Some("/qa/auth0/crunittest"));
    assert_eq!(ctx.outputs.get("ClientId").map(String::as_str), Some("client_1"));
    assert!(ctx.outputs["Arn"].ends_with(":secret:/qa/auth0/crunittest"));
}

#[tokio::test]
async fn test_create_spa_application() {
    let harness = Harness::new();
    let mut ctx = ReconcileContext {
        tags: props(json!({
            "ApplicationID": "227319dd-0762-4e59-8800-f18d30cce402",
            "TeamName": "identity",
            "AllowAdGroups": ["foo", "bar"]
        })),
        ..ReconcileContext::default()
    };

    let physical_id = harness
        .application()
        .create(&app_props("spa"), &mut ctx)
        .await
        .unwrap();

    assert_eq!(physical_id, "client_1");
    assert_eq!(
        harness.parameters.get("/qa/auth0/client_1/client_secret").as_deref(),
        Some("client_1_secret")
    );
    assert_eq!(
        ctx.outputs.get("ClientSecret").map(String::as_str),
        Some("/qa/auth0/client_1/client_secret")
    );

    let calls = harness.provider.calls();
    let ProviderCall::CreateApplication(fields) = &calls[0] else {
        panic!("unexpected call: {:?}", calls[0]);
    };
    assert_eq!(
        Value::Object(fields.clone()),
        json!({
            "app_type": "spa",
            "name": "cr-unittest",
            "description": "test",
            "client_metadata": {
                "ApplicationID": "227319dd-0762-4e59-8800-f18d30cce402",
                "AllowAdGroups": "[\"foo\",\"bar\"]"
            },
            "token_endpoint_auth_method": "none",
            "grant_types": ["implicit", "authorization_code", "refresh_token"]
        })
    );
}

#[tokio::test]
async fn test_create_enables_connections() {
    let harness = Harness::new();
    let props = with(app_props("web"), "Connections", json!(["con_a", "con_b"]));

    harness
        .application()
        .create(&props, &mut ReconcileContext::default())
        .await
        .unwrap();

    let mutations = harness.provider.mutations();
    assert!(mutations.contains(&ProviderCall::AddToConnection {
        connection_id: "con_a".to_string(),
        client_id: "client_1".to_string(),
    }));
    assert!(mutations.contains(&ProviderCall::AddToConnection {
        connection_id: "con_b".to_string(),
        client_id: "client_1".to_string(),
    }));
}

#[tokio::test]
async fn test_create_compensates_when_secret_storage_fails() {
    let harness = Harness::new();
    harness.parameters.fail_puts();

    let err = harness
        .application()
        .create(&app_props("spa"), &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ParameterStore { .. }));
    assert_eq!(
        harness.provider.mutations().last(),
        Some(&ProviderCall::DeleteApplication("client_1".to_string()))
    );
}

#[tokio::test]
async fn test_create_compensates_when_connection_fails() {
    let harness = Harness::new();
    harness.provider.fail_connection("con_bad");
    let props = with(app_props("spa"), "Connections", json!(["con_ok", "con_bad"]));

    let err = harness
        .application()
        .create(&props, &mut ReconcileContext::default())
        .await
        .unwrap_err();

    match err {
        Error::ConnectionMembership { failed_add, .. } => assert_eq!(failed_add, vec!["con_bad"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(harness
        .provider
        .mutations()
        .contains(&ProviderCall::DeleteApplication("client_1".to_string())));
}

#[tokio::test]
async fn test_compensation_failure_keeps_original_error() {
    let harness = Harness::new();
    harness.secrets.fail(SecretOp::Create, "AccessDeniedException");
    harness.provider.fail_invalid_identifier(ProviderOp::DeleteApplication);

    let err = harness
        .application()
        .create(&app_props("m2m"), &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SecretStore(_)));
}

#[tokio::test]
async fn test_create_validation_failure() {
    let harness = Harness::new();
    let props = with(app_props("spa"), "Type", json!("bar"));

    let err = harness
        .application()
        .create(&props, &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation { .. }));
    assert!(harness.provider.calls().is_empty());
}

#[tokio::test]
async fn test_update_rejects_type_change() {
    let harness = Harness::new();

    let err = harness
        .application()
        .update(
            "client_9",
            &app_props("spa"),
            &app_props("web"),
            &mut ReconcileContext::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TypeChangeNotSupported { .. }));
    assert!(harness.provider.mutations().is_empty());
}

#[tokio::test]
async fn test_update_without_previous_type() {
    let harness = Harness::new();
    let old = props(json!({"Tenant": "foo.com", "Name": "cr-unittest"}));

    let physical_id = harness
        .application()
        .update("client_9", &app_props("spa"), &old, &mut ReconcileContext::default())
        .await
        .unwrap();

    assert_eq!(physical_id, "client_9");
}

#[tokio::test]
async fn test_update_clears_removed_ad_groups() {
    let harness = Harness::new();
    let old = with(app_props("spa"), "AllowAdGroups", json!(["foo"]));

    harness
        .application()
        .update("client_9", &app_props("spa"), &old, &mut ReconcileContext::default())
        .await
        .unwrap();

    let calls = harness.provider.mutations();
    let ProviderCall::UpdateApplication { client_id, fields } = &calls[0] else {
        panic!("unexpected call: {:?}", calls[0]);
    };
    assert_eq!(client_id, "client_9");
    assert_eq!(fields["client_metadata"], json!({"AllowAdGroups": null}));
}

#[tokio::test]
async fn test_update_m2m_resolves_client_from_secret() {
    let harness = Harness::new();
    harness.secrets.insert("/qa/auth0/svc", m2m_secret("abc"));
    let mut ctx = ReconcileContext::default();

    let physical_id = harness
        .application()
        .update("/qa/auth0/svc", &app_props("m2m"), &app_props("m2m"), &mut ctx)
        .await
        .unwrap();

    assert_eq!(physical_id, "/qa/auth0/svc");
    assert!(matches!(
        &harness.provider.mutations()[0],
        ProviderCall::UpdateApplication { client_id, .. } if client_id == "abc"
    ));
    assert_eq!(ctx.outputs.get("ClientId").map(String::as_str), Some("abc"));
    assert_eq!(ctx.outputs.get("Name").map(String::as_str), Some("/qa/auth0/svc"));
    assert!(ctx.outputs.contains_key("Arn"));
}

#[tokio::test]
async fn test_update_reconciles_connection_difference() {
    let harness = Harness::new();
    let old = with(app_props("spa"), "Connections", json!(["A", "B"]));
    let new = with(app_props("spa"), "Connections", json!(["B", "C"]));

    harness
        .application()
        .update("client_9", &new, &old, &mut ReconcileContext::default())
        .await
        .unwrap();

    let membership: Vec<ProviderCall> = harness
        .provider
        .mutations()
        .into_iter()
        .filter(|call| {
            matches!(
                call,
                ProviderCall::AddToConnection { .. } | ProviderCall::RemoveFromConnection { .. }
            )
        })
        .collect();
    assert_eq!(
        membership,
        vec![
            ProviderCall::AddToConnection {
                connection_id: "C".to_string(),
                client_id: "client_9".to_string(),
            },
            ProviderCall::RemoveFromConnection {
                connection_id: "A".to_string(),
                client_id: "client_9".to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_update_reports_every_failed_connection() {
    let harness = Harness::new();
    harness.provider.fail_connection("C");
    harness.provider.fail_connection("A");
    let old = with(app_props("spa"), "Connections", json!(["A", "B"]));
    let new = with(app_props("spa"), "Connections", json!(["B", "C", "D"]));

    let err = harness
        .application()
        .update("client_9", &new, &old, &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to add: [\"C\"], failed to delete: [\"A\"]"
    );
    assert!(harness.provider.mutations().contains(&ProviderCall::AddToConnection {
        connection_id: "D".to_string(),
        client_id: "client_9".to_string(),
    }));
}

#[tokio::test]
async fn test_delete_m2m_application() {
    let harness = Harness::new();
    harness.secrets.insert("/qa/auth0/svc", m2m_secret("abc"));

    harness
        .application()
        .delete("/qa/auth0/svc", &app_props("m2m"))
        .await
        .unwrap();

    assert_eq!(
        harness.provider.mutations(),
        vec![ProviderCall::DeleteApplication("abc".to_string())]
    );
    assert_eq!(harness.secrets.deleted(), vec![("/qa/auth0/svc".to_string(), true)]);
}

#[tokio::test]
async fn test_delete_legacy_secret_locator_without_type() {
    let harness = Harness::new();
    harness.secrets.insert("/qa/auth0/svc", m2m_secret("abc"));
    let props = props(json!({"Tenant": "foo.com"}));

    harness.application().delete("/qa/auth0/svc", &props).await.unwrap();

    assert_eq!(
        harness.provider.mutations(),
        vec![ProviderCall::DeleteApplication("abc".to_string())]
    );
}

#[tokio::test]
async fn test_delete_m2m_with_missing_secret() {
    let harness = Harness::new();

    harness
        .application()
        .delete("/qa/auth0/gone", &app_props("m2m"))
        .await
        .unwrap();

    assert!(harness.provider.mutations().is_empty());
}

#[tokio::test]
async fn test_delete_m2m_with_denied_secret() {
    let harness = Harness::new();
    harness.secrets.fail(SecretOp::Get, "AccessDeniedException");

    harness
        .application()
        .delete("/qa/auth0/svc", &app_props("m2m"))
        .await
        .unwrap();

    assert!(harness.provider.mutations().is_empty());
}

#[tokio::test]
async fn test_delete_m2m_with_other_secret_error() {
    let harness = Harness::new();
    harness.secrets.fail(SecretOp::Get, "InternalServiceError");

    let err = harness
        .application()
        .delete("/qa/auth0/svc", &app_props("m2m"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::SecretStore(_)));
}

#[tokio::test]
async fn test_delete_removes_client_secret_parameter() {
    let harness = Harness::new();
    harness
        .parameters
        .insert("/qa/auth0/client_9/client_secret", "s3cr3t");

    harness
        .application()
        .delete("client_9", &app_props("spa"))
        .await
        .unwrap();

    assert!(harness.parameters.get("/qa/auth0/client_9/client_secret").is_none());
}

#[tokio::test]
async fn test_delete_invalid_ids_succeed() {
    let harness = Harness::new();
    harness.provider.fail_invalid_identifier(ProviderOp::DeleteApplication);
    harness.provider.fail_invalid_identifier(ProviderOp::DeleteApi);
    harness.provider.fail_invalid_identifier(ProviderOp::DeleteGrant);
    let tenant_only = props(json!({"Tenant": "foo.com"}));

    harness
        .application()
        .delete("invalid_id", &app_props("spa"))
        .await
        .unwrap();
    harness.api().delete("invalid_id", &tenant_only).await.unwrap();
    harness.grant().delete("invalid_id", &tenant_only).await.unwrap();
}

#[tokio::test]
async fn test_delete_other_remote_errors_propagate() {
    let harness = Harness::new();
    harness.provider.fail(
        ProviderOp::DeleteApi,
        crate::error::RemoteError::new(403, "insufficient_scope", "Insufficient scope"),
    );

    let err = harness
        .api()
        .delete("api_9", &props(json!({"Tenant": "foo.com"})))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote(_)));
}

#[tokio::test]
async fn test_missing_tenant() {
    let harness = Harness::new();

    let err = harness
        .grant()
        .delete("grant_9", &Document::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingField { .. }));
}

// ============================================================================
// Api
// ============================================================================

fn api_props(audience: &str) -> Document {
    props(json!({"Tenant": "foo.com", "Name": "api", "Audience": audience}))
}

#[tokio::test]
async fn test_create_api() {
    let harness = Harness::new();
    let mut ctx = ReconcileContext::default();

    let api_id = harness
        .api()
        .create(&api_props("https://one"), &mut ctx)
        .await
        .unwrap();

    assert_eq!(api_id, "api_1");
    assert_eq!(ctx.outputs.get("ApiId").map(String::as_str), Some("api_1"));
    assert_eq!(ctx.outputs.get("Audience").map(String::as_str), Some("https://one"));
}

#[tokio::test]
async fn test_create_api_adopts_existing_server() {
    let harness = Harness::new();
    harness.provider.fail_conflict(ProviderOp::CreateApi);
    harness.provider.insert_resource_server("rs_other", "https://other");
    harness.provider.insert_resource_server("rs_one", "https://one");

    let api_id = harness
        .api()
        .create(&api_props("https://one"), &mut ReconcileContext::default())
        .await
        .unwrap();

    assert_eq!(api_id, "rs_one");
}

#[tokio::test]
async fn test_create_api_conflict_without_match() {
    let harness = Harness::new();
    harness.provider.fail_conflict(ProviderOp::CreateApi);

    let err = harness
        .api()
        .create(&api_props("https://one"), &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_update_api_in_place() {
    let harness = Harness::new();

    let api_id = harness
        .api()
        .update(
            "api_9",
            &api_props("https://one"),
            &api_props("https://one"),
            &mut ReconcileContext::default(),
        )
        .await
        .unwrap();

    assert_eq!(api_id, "api_9");
    assert_eq!(
        harness.provider.mutations(),
        vec![ProviderCall::UpdateApi {
            api_id: "api_9".to_string(),
            fields: props(json!({"name": "api"})),
        }]
    );
}

#[tokio::test]
async fn test_update_api_audience_change_replaces() {
    let harness = Harness::new();
    let mut ctx = ReconcileContext::default();

    let api_id = harness
        .api()
        .update(
            "api_9",
            &api_props("https://two"),
            &api_props("https://one"),
            &mut ctx,
        )
        .await
        .unwrap();

    assert_eq!(api_id, "api_1");
    assert_eq!(
        harness.provider.mutations(),
        vec![
            ProviderCall::CreateApi(props(json!({"name": "api", "identifier": "https://two"}))),
            ProviderCall::DeleteApi("api_9".to_string()),
        ]
    );
    assert_eq!(ctx.outputs.get("Audience").map(String::as_str), Some("https://two"));
}

// ============================================================================
// Grant
// ============================================================================

fn grant_props() -> Document {
    props(json!({
        "Tenant": "foo.com",
        "ApplicationId": "client_9",
        "Audience": "https://one"
    }))
}

#[tokio::test]
async fn test_create_grant() {
    let harness = Harness::new();
    let mut ctx = ReconcileContext::default();

    let grant_id = harness.grant().create(&grant_props(), &mut ctx).await.unwrap();

    assert_eq!(grant_id, "grant_1");
    assert_eq!(
        harness.provider.mutations(),
        vec![ProviderCall::CreateGrant(props(json!({
            "client_id": "client_9",
            "audience": "https://one",
            "scope": []
        })))]
    );
    assert_eq!(ctx.outputs.get("GrantId").map(String::as_str), Some("grant_1"));
}

#[tokio::test]
async fn test_update_grant_conflict_keeps_id() {
    let harness = Harness::new();
    harness.provider.fail_conflict(ProviderOp::CreateGrant);
    let mut ctx = ReconcileContext::default();

    let grant_id = harness
        .grant()
        .update("grant_9", &grant_props(), &grant_props(), &mut ctx)
        .await
        .unwrap();

    assert_eq!(grant_id, "grant_9");
    assert_eq!(ctx.outputs.get("GrantId").map(String::as_str), Some("grant_9"));
}

#[tokio::test]
async fn test_update_grant_other_error_propagates() {
    let harness = Harness::new();
    harness.provider.fail(
        ProviderOp::CreateGrant,
        crate::error::RemoteError::new(404, "inexistent_client", "Client not found"),
    );

    let err = harness
        .grant()
        .update("grant_9", &grant_props(), &grant_props(), &mut ReconcileContext::default())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Remote(_)));
}

// ============================================================================
// Connections
// ============================================================================

#[test]
fn test_connection_changes_between() {
    let strings = |items: &[&str]| items.iter().map(|s| (*s).to_string()).collect::<Vec<_>>();

    let changes = ConnectionChanges::between(&strings(&["A", "B"]), &strings(&["B", "C"]));

    assert_eq!(changes.add, vec!["C"]);
    assert_eq!(changes.remove, vec!["A"]);
    assert!(ConnectionChanges::between(&strings(&["A"]), &strings(&["A"])).is_empty());
}
