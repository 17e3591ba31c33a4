//! Integration tests
//!
//! Lifecycle events run through the dispatcher end to end: against a mock
//! management API served by wiremock, or against the in-memory
//! collaborators of `authn_cr::testing`.

use async_trait::async_trait;
use authn_cr::cloud::{StackEvent, STAGE_CURRENT};
use authn_cr::config::Settings;
use authn_cr::provider::{Auth0Client, IdentityProvider, ManagementCredentials, ProviderFactory};
use authn_cr::testing::{
    MemoryParameterStore, MemorySecretStore, ProviderCall, ProviderOp, RecordingProvider,
    StaticProviderFactory, StaticStack,
};
use authn_cr::{
    document_from, Document, Error, LifecycleDispatcher, LifecycleEvent, RequestType,
    RotationEvent, SecretRotator, Services, StackTag,
};
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STACK_ID: &str = "arn:aws:cloudformation:us-east-1:000000000000:stack/authn/1";

fn settings() -> Settings {
    let mut settings = Settings {
        environ: "qa".to_string(),
        kms_key_id: Some("baz_key".to_string()),
        rotation: Some("arn:aws:lambda:us-east-1:000000000000:function:rotate".to_string()),
        poll_interval_seconds: 0,
        poll_attempts: 1,
        page_delay_ms: 0,
        ..Settings::default()
    };
    settings.http.max_retries = 0;
    settings.http.requests_per_second = 100;
    settings
}

fn event(request_type: RequestType, resource_type: &str, props: Value) -> LifecycleEvent {
    LifecycleEvent::new(request_type, resource_type, document_from(props)).with_stack_id(STACK_ID)
}

fn application(app_type: &str, name: &str) -> Value {
    json!({
        "ServiceToken": "arn:aws:lambda:us-east-1:000000000000:function:authn-cr",
        "Tenant": "acme-qa.auth0.com",
        "Type": app_type,
        "Name": name,
        "Description": "integration"
    })
}

// ============================================================================
// Against the management API
// ============================================================================

/// Hands out real management clients pointed at a mock server
struct MockTenantFactory {
    base_url: String,
    settings: Settings,
}

#[async_trait]
impl ProviderFactory for MockTenantFactory {
    async fn provider(&self, _tenant: &str) -> authn_cr::Result<Arc<dyn IdentityProvider>> {
        let credentials = ManagementCredentials {
            client_id: "admin".to_string(),
            client_secret: "admin-secret".to_string(),
        };
        Ok(Arc::new(Auth0Client::with_base_url(
            &self.base_url,
            &credentials,
            &self.settings,
        )?))
    }
}

struct Tenant {
    server: MockServer,
    parameters: Arc<MemoryParameterStore>,
    dispatcher: LifecycleDispatcher,
}

async fn tenant() -> Tenant {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "issued",
            "expires_in": 86400,
            "token_type": "Bearer"
        })))
        .mount(&server)
        .await;

    let parameters = Arc::new(MemoryParameterStore::new());
    let services = Arc::new(Services {
        settings: settings(),
        providers: Arc::new(MockTenantFactory {
            base_url: server.uri(),
            settings: settings(),
        }),
        secrets: Arc::new(MemorySecretStore::new()),
        parameters: parameters.clone(),
        stacks: Arc::new(StaticStack::new(vec![StackTag::new(
            "ApplicationID",
            "227319dd-0762-4e59-8800-f18d30cce402",
        )])),
    });
    Tenant {
        server,
        parameters,
        dispatcher: LifecycleDispatcher::new(services),
    }
}

#[tokio::test]
async fn test_create_spa_against_management_api() {
    let tenant = tenant().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/clients"))
        .and(header("Authorization", "Bearer issued"))
        .and(body_json(json!({
            "app_type": "spa",
            "name": "portal",
            "description": "integration",
            "client_metadata": {"ApplicationID": "227319dd-0762-4e59-8800-f18d30cce402"},
            "token_endpoint_auth_method": "none",
            "grant_types": ["implicit", "authorization_code", "refresh_token"]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "client_id": "abc",
            "client_secret": "s3cr3t"
        })))
        .expect(1)
        .mount(&tenant.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v2/connections/con_1"))
        .and(query_param("fields", "enabled_clients"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "enabled_clients": ["other"]
        })))
        .mount(&tenant.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/v2/connections/con_1"))
        .and(body_json(json!({"enabled_clients": ["other", "abc"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "con_1"})))
        .expect(1)
        .mount(&tenant.server)
        .await;

    let mut props = application("spa", "portal");
    props["Connections"] = json!(["con_1"]);
    let response = tenant
        .dispatcher
        .handle(&event(RequestType::Create, "Custom::Authn_Application", props))
        .await
        .unwrap();

    assert_eq!(response.physical_resource_id, "abc");
    assert_eq!(response.data["ClientId"], "abc");
    assert_eq!(
        tenant.parameters.get("/qa/auth0/abc/client_secret").as_deref(),
        Some("s3cr3t")
    );
}

#[tokio::test]
async fn test_delete_invalid_ids_against_management_api() {
    let tenant = tenant().await;
    for resource in ["clients", "resource-servers", "client-grants"] {
        Mock::given(method("DELETE"))
            .and(path(format!("/api/v2/{resource}/invalid_id")))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "statusCode": 400,
                "error": "Bad Request",
                "message": "Path validation error: 'String does not match pattern' on property id",
                "errorCode": "invalid_uri"
            })))
            .expect(1)
            .mount(&tenant.server)
            .await;
    }

    for resource_type in ["Custom::Authn_Application", "Custom::Authn_Api", "Custom::Authn_Grant"] {
        let delete = event(RequestType::Delete, resource_type, application("spa", "gone"))
            .with_physical_id("invalid_id");
        let response = tenant.dispatcher.handle(&delete).await.unwrap();
        assert_eq!(response.physical_resource_id, "invalid_id");
    }
}

#[tokio::test]
async fn test_grant_update_conflict_against_management_api() {
    let tenant = tenant().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/client-grants"))
        .and(body_json(json!({
            "client_id": "abc",
            "audience": "https://api.acme.com",
            "scope": ["read:things"]
        })))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "statusCode": 409,
            "error": "Conflict",
            "message": "A client grant for this client and audience already exists",
            "errorCode": "client_grant_already_exists"
        })))
        .mount(&tenant.server)
        .await;

    let props = json!({
        "Tenant": "acme-qa.auth0.com",
        "ApplicationId": "abc",
        "Audience": "https://api.acme.com",
        "Scope": ["read:things"]
    });
    let update = event(RequestType::Update, "Custom::Authn_Grant", props.clone())
        .with_physical_id("cgr_1")
        .with_old_properties(document_from(props));

    let response = tenant.dispatcher.handle(&update).await.unwrap();

    assert_eq!(response.physical_resource_id, "cgr_1");
    assert_eq!(response.data["GrantId"], "cgr_1");
}

#[tokio::test]
async fn test_remote_error_surfaces() {
    let tenant = tenant().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/resource-servers"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "statusCode": 403,
            "error": "Forbidden",
            "message": "Insufficient scope, expected any of: create:resource_servers",
            "errorCode": "insufficient_scope"
        })))
        .mount(&tenant.server)
        .await;

    let err = tenant
        .dispatcher
        .handle(&event(
            RequestType::Create,
            "Custom::Authn_Api",
            json!({"Tenant": "acme-qa.auth0.com", "Name": "api", "Audience": "https://api"}),
        ))
        .await
        .unwrap_err();

    match err {
        Error::Remote(remote) => {
            assert_eq!(remote.status_code, 403);
            assert_eq!(remote.error_code, "insufficient_scope");
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ============================================================================
// Against in-memory collaborators
// ============================================================================

struct Fakes {
    provider: Arc<RecordingProvider>,
    secrets: Arc<MemorySecretStore>,
    stack: Arc<StaticStack>,
    services: Arc<Services>,
}

fn fakes() -> Fakes {
    let provider = Arc::new(RecordingProvider::new());
    let secrets = Arc::new(MemorySecretStore::new());
    let stack = Arc::new(StaticStack::new(vec![StackTag::new("TeamName", "identity")]));
    let services = Arc::new(Services {
        settings: settings(),
        providers: Arc::new(StaticProviderFactory::new(provider.clone())),
        secrets: secrets.clone(),
        parameters: Arc::new(MemoryParameterStore::new()),
        stacks: stack.clone(),
    });
    Fakes {
        provider,
        secrets,
        stack,
        services,
    }
}

impl Fakes {
    fn dispatcher(&self) -> LifecycleDispatcher {
        LifecycleDispatcher::new(self.services.clone())
    }
}

#[tokio::test]
async fn test_m2m_lifecycle() {
    let fakes = fakes();
    let dispatcher = fakes.dispatcher();

    let created = dispatcher
        .handle(&event(
            RequestType::Create,
            "Custom::Authn_Application",
            application("m2m", "Billing Service"),
        ))
        .await
        .unwrap();

    assert_eq!(created.physical_resource_id, "/qa/auth0/billingservice");
    assert_eq!(created.data["Name"], "/qa/auth0/billingservice");
    assert_eq!(created.data["ClientId"], "client_1");
    assert_eq!(
        fakes.secrets.rotation("/qa/auth0/billingservice").map(|(_, days)| days),
        Some(30)
    );
    assert_eq!(
        fakes.secrets.tags("/qa/auth0/billingservice"),
        vec![StackTag::new("TeamName", "identity")]
    );

    let mut renamed = application("m2m", "Billing Service");
    renamed["Description"] = json!("renamed");
    let updated = dispatcher
        .handle(
            &event(RequestType::Update, "Custom::Authn_Application", renamed)
                .with_physical_id(&created.physical_resource_id)
                .with_old_properties(document_from(application("m2m", "Billing Service"))),
        )
        .await
        .unwrap();
    assert_eq!(updated.physical_resource_id, created.physical_resource_id);

    dispatcher
        .handle(
            &event(
                RequestType::Delete,
                "Custom::Authn_Application",
                application("m2m", "Billing Service"),
            )
            .with_physical_id(&created.physical_resource_id),
        )
        .await
        .unwrap();

    assert!(!fakes.secrets.contains("/qa/auth0/billingservice"));
    assert_eq!(
        fakes.provider.mutations().last(),
        Some(&ProviderCall::DeleteApplication("client_1".to_string()))
    );
}

#[tokio::test]
async fn test_type_change_is_rejected() {
    let fakes = fakes();

    let err = fakes
        .dispatcher()
        .handle(
            &event(RequestType::Update, "Custom::Authn_Application", application("web", "app"))
                .with_physical_id("client_9")
                .with_old_properties(document_from(application("spa", "app"))),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::TypeChangeNotSupported { .. }));
    assert!(fakes.provider.mutations().is_empty());
}

#[tokio::test]
async fn test_api_audience_change_replaces_resource() {
    let fakes = fakes();
    let props = |audience: &str| {
        json!({"Tenant": "acme-qa.auth0.com", "Name": "api", "Audience": audience})
    };

    let response = fakes
        .dispatcher()
        .handle(
            &event(RequestType::Update, "Custom::Authn_Api", props("https://v2"))
                .with_physical_id("api_old")
                .with_old_properties(document_from(props("https://v1"))),
        )
        .await
        .unwrap();

    assert_eq!(response.physical_resource_id, "api_1");
    assert_eq!(
        fakes.provider.mutations().last(),
        Some(&ProviderCall::DeleteApi("api_old".to_string()))
    );
}

#[tokio::test]
async fn test_failed_stack_tears_down_created_api() {
    let fakes = fakes();
    fakes.stack.set_events(vec![
        StackEvent::new("Api", "CREATE_FAILED", Some("Resource creation cancelled")),
        StackEvent::new("authn", "CREATE_IN_PROGRESS", Some("User Initiated")),
    ]);

    let response = fakes
        .dispatcher()
        .handle(&event(
            RequestType::Create,
            "Custom::Authn_Api",
            json!({"Tenant": "acme-qa.auth0.com", "Name": "api", "Audience": "https://api"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.physical_resource_id, "api_1");
    assert_eq!(
        fakes.provider.mutations().last(),
        Some(&ProviderCall::DeleteApi("api_1".to_string()))
    );
}

#[tokio::test]
async fn test_validation_failure_makes_no_remote_calls() {
    let fakes = fakes();
    fakes.provider.fail_conflict(ProviderOp::CreateApplication);

    let err = fakes
        .dispatcher()
        .handle(&event(
            RequestType::Create,
            "Custom::Authn_Application",
            json!({"Tenant": "acme-qa.auth0.com", "Type": "spa"}),
        ))
        .await
        .unwrap_err();

    let Error::Validation { errors } = err else {
        panic!("expected a validation error");
    };
    assert!(errors.get("name").is_some());
    assert!(fakes.provider.calls().is_empty());
}

#[tokio::test]
async fn test_rotation_of_created_secret() {
    let fakes = fakes();
    let created = fakes
        .dispatcher()
        .handle(&event(
            RequestType::Create,
            "Custom::Authn_Application",
            application("m2m", "svc"),
        ))
        .await
        .unwrap();
    let secret_id = created.data["Arn"].clone();
    let token = "f0e1d2c3-0000-4000-8000-000000000002";
    fakes.secrets.begin_rotation(&created.physical_resource_id, token);

    let rotator = SecretRotator::new(
        fakes.services.secrets.clone(),
        fakes.services.providers.clone(),
    );
    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        rotator
            .handle(&RotationEvent {
                secret_id: secret_id.clone(),
                client_request_token: token.to_string(),
                step: step.to_string(),
            })
            .await
            .unwrap();
    }

    let current: Document = serde_json::from_str(
        &fakes
            .secrets
            .value(&created.physical_resource_id, STAGE_CURRENT)
            .unwrap(),
    )
    .unwrap();
    assert_eq!(current["client_id"], "client_1");
    assert_eq!(
        current["client_secret"].as_str(),
        fakes.provider.client_secret("client_1").as_deref()
    );
    assert_ne!(current["client_secret"], "client_1_secret");
}
