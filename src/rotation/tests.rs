//! Rotation handler tests

use super::*;
use crate::testing::{MemorySecretStore, ProviderCall, RecordingProvider, StaticProviderFactory};
use crate::types::document_from;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const SECRET: &str = "/qa/auth0/svc";
const TOKEN: &str = "9f8e7d6c-0000-4000-8000-000000000001";

struct Harness {
    secrets: Arc<MemorySecretStore>,
    provider: Arc<RecordingProvider>,
    factory: Arc<StaticProviderFactory>,
    rotator: SecretRotator,
}

fn harness() -> Harness {
    let secrets = Arc::new(MemorySecretStore::new());
    secrets.insert(
        SECRET,
        json!({"client_id": "abc", "client_secret": "old", "tenant": "foo.com"}).to_string(),
    );
    let provider = Arc::new(RecordingProvider::new());
    provider.insert_application("abc", "old");
    let factory = Arc::new(StaticProviderFactory::new(provider.clone()));
    let rotator = SecretRotator::new(secrets.clone(), factory.clone());
    Harness {
        secrets,
        provider,
        factory,
        rotator,
    }
}

fn event(step: &str) -> RotationEvent {
    RotationEvent {
        secret_id: SECRET.to_string(),
        client_request_token: TOKEN.to_string(),
        step: step.to_string(),
    }
}

fn stored(harness: &Harness, stage: &str) -> Value {
    serde_json::from_str(&harness.secrets.value(SECRET, stage).unwrap()).unwrap()
}

#[tokio::test]
async fn test_create_secret_stages_rotated_credentials() {
    let harness = harness();
    harness.secrets.begin_rotation(SECRET, TOKEN);

    harness.rotator.handle(&event("createSecret")).await.unwrap();

    assert_eq!(
        harness.provider.mutations(),
        vec![ProviderCall::RotateClientSecret("abc".to_string())]
    );
    assert_eq!(
        stored(&harness, "AWSPENDING"),
        json!({"client_id": "abc", "client_secret": "rotated_1", "tenant": "foo.com"})
    );
    assert_eq!(harness.factory.tenants(), vec!["foo.com"]);
}

#[tokio::test]
async fn test_create_secret_rolls_back_when_version_exists() {
    let harness = harness();
    harness.secrets.set_rotation_enabled(SECRET, true);
    harness.secrets.insert_version(SECRET, TOKEN, "{}", &["AWSPENDING"]);

    harness.rotator.handle(&event("createSecret")).await.unwrap();

    assert_eq!(
        harness.provider.mutations(),
        vec![
            ProviderCall::RotateClientSecret("abc".to_string()),
            ProviderCall::UpdateApplication {
                client_id: "abc".to_string(),
                fields: document_from(json!({"client_secret": "old"})),
            },
        ]
    );
    assert_eq!(harness.provider.client_secret("abc").as_deref(), Some("old"));
}

#[tokio::test]
async fn test_full_rotation() {
    let harness = harness();
    harness.secrets.begin_rotation(SECRET, TOKEN);

    for step in ["createSecret", "setSecret", "testSecret", "finishSecret"] {
        harness.rotator.handle(&event(step)).await.unwrap();
    }

    assert_eq!(stored(&harness, "AWSCURRENT")["client_secret"], "rotated_1");
    assert_eq!(harness.secrets.stages(SECRET, "v1"), vec!["AWSPREVIOUS"]);
    assert!(harness
        .secrets
        .stages(SECRET, TOKEN)
        .contains(&"AWSCURRENT".to_string()));
}

#[tokio::test]
async fn test_set_secret_is_a_no_op() {
    let harness = harness();
    harness.secrets.begin_rotation(SECRET, TOKEN);

    harness.rotator.handle(&event("setSecret")).await.unwrap();

    assert!(harness.provider.mutations().is_empty());
    assert_eq!(harness.secrets.stages(SECRET, TOKEN), vec!["AWSPENDING"]);
}

#[tokio::test]
async fn test_test_secret_detects_mismatch() {
    let harness = harness();
    harness.secrets.set_rotation_enabled(SECRET, true);
    harness.secrets.insert_version(
        SECRET,
        TOKEN,
        json!({"client_id": "abc", "client_secret": "other", "tenant": "foo.com"}).to_string(),
        &["AWSPENDING"],
    );

    let err = harness.rotator.handle(&event("testSecret")).await.unwrap_err();

    assert!(matches!(err, Error::Rotation { .. }));
}

#[tokio::test]
async fn test_finish_secret_when_token_is_current() {
    let harness = harness();
    harness.secrets.set_rotation_enabled(SECRET, true);
    let current = RotationEvent {
        client_request_token: "v1".to_string(),
        ..event("finishSecret")
    };

    harness.rotator.handle(&current).await.unwrap();

    assert!(harness.factory.tenants().is_empty());
    assert_eq!(harness.secrets.stages(SECRET, "v1"), vec!["AWSCURRENT"]);
}

#[tokio::test]
async fn test_rotation_disabled() {
    let harness = harness();

    let err = harness.rotator.handle(&event("createSecret")).await.unwrap_err();

    assert_eq!(
        err.to_string(),
        "Rotation error: Secret /qa/auth0/svc is not enabled for rotation"
    );
}

#[tokio::test]
async fn test_unknown_token() {
    let harness = harness();
    harness.secrets.set_rotation_enabled(SECRET, true);

    let err = harness.rotator.handle(&event("createSecret")).await.unwrap_err();

    assert!(err.to_string().contains("has no stage for rotation"));
}

#[tokio::test]
async fn test_token_not_pending() {
    let harness = harness();
    harness.secrets.set_rotation_enabled(SECRET, true);
    harness.secrets.insert_version(SECRET, TOKEN, "{}", &[]);

    let err = harness.rotator.handle(&event("createSecret")).await.unwrap_err();

    assert!(err.to_string().contains("not set as AWSPENDING"));
    assert!(harness.provider.mutations().is_empty());
}

#[tokio::test]
async fn test_invalid_step() {
    let harness = harness();
    harness.secrets.begin_rotation(SECRET, TOKEN);

    let err = harness.rotator.handle(&event("launchSecret")).await.unwrap_err();

    assert_eq!(err.to_string(), "Rotation error: Invalid step parameter");
    assert!(harness.provider.mutations().is_empty());
}

#[test]
fn test_rotation_event_from_json() {
    let event: RotationEvent = serde_json::from_value(json!({
        "SecretId": "arn:aws:secretsmanager:us-east-1:000000000000:secret:/qa/auth0/svc",
        "ClientRequestToken": TOKEN,
        "Step": "testSecret"
    }))
    .unwrap();

    assert_eq!(event.step.parse::<RotationStep>().unwrap(), RotationStep::TestSecret);
    assert_eq!(RotationStep::FinishSecret.to_string(), "finishSecret");
}
