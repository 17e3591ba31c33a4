//! In-memory collaborators for tests
//!
//! Recording implementations of every external collaborator. Each keeps
//! enough state to answer follow-up calls the way the real service would
//! and logs the calls it received, so tests can assert on the exact
//! sequence of remote mutations. Failures are injected per operation.

use crate::cloud::{
    CreateSecretRequest, ParameterStore, SecretMetadata, SecretRecord, SecretRef, SecretStore,
    SecretValue, StackEvent, StackInspector, STAGE_CURRENT, STAGE_PENDING,
};
use crate::error::{Error, RemoteError, Result, SecretStoreError};
use crate::provider::{CreatedApplication, IdentityProvider, ProviderFactory};
use crate::types::{Document, JsonValue, StackTag};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Stage a previous current version is moved to
const STAGE_PREVIOUS: &str = "AWSPREVIOUS";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Identity Provider
// ============================================================================

/// Provider verbs, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderOp {
    CreateApplication,
    UpdateApplication,
    DeleteApplication,
    CreateApi,
    UpdateApi,
    DeleteApi,
    CreateGrant,
    DeleteGrant,
    AddToConnection,
    RemoveFromConnection,
    RotateClientSecret,
    GetApplication,
    ListResourceServers,
}

/// A call received by [`RecordingProvider`]
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    CreateApplication(Document),
    UpdateApplication { client_id: String, fields: Document },
    DeleteApplication(String),
    CreateApi(Document),
    UpdateApi { api_id: String, fields: Document },
    DeleteApi(String),
    CreateGrant(Document),
    DeleteGrant(String),
    AddToConnection { connection_id: String, client_id: String },
    RemoveFromConnection { connection_id: String, client_id: String },
    RotateClientSecret(String),
    GetApplication(String),
    ListResourceServers { page: u32, per_page: u32 },
}

/// Identity provider that records calls and keeps applications in memory.
///
/// Created ids are sequential per kind: `client_1`, `api_1`, `grant_1`.
#[derive(Debug, Default)]
pub struct RecordingProvider {
    calls: Mutex<Vec<ProviderCall>>,
    failures: Mutex<HashMap<ProviderOp, RemoteError>>,
    failing_connections: Mutex<HashSet<String>>,
    applications: Mutex<BTreeMap<String, Document>>,
    resource_servers: Mutex<Vec<Document>>,
    sequence: AtomicU32,
}

impl RecordingProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call of `op` with `error`
    pub fn fail(&self, op: ProviderOp, error: RemoteError) {
        lock(&self.failures).insert(op, error);
    }

    /// Fail `op` with the management API's malformed identifier error
    pub fn fail_invalid_identifier(&self, op: ProviderOp) {
        self.fail(
            op,
            RemoteError::new(
                400,
                "invalid_uri",
                "Path validation error: 'String does not match pattern' on property id",
            ),
        );
    }

    /// Fail `op` with a duplicate creation error
    pub fn fail_conflict(&self, op: ProviderOp) {
        self.fail(
            op,
            RemoteError::new(409, "conflict", "A resource with the same identifier already exists"),
        );
    }

    /// Fail membership changes on one connection
    pub fn fail_connection(&self, connection_id: &str) {
        lock(&self.failing_connections).insert(connection_id.to_string());
    }

    /// Register an existing application
    pub fn insert_application(&self, client_id: &str, client_secret: &str) {
        let mut application = Document::new();
        application.insert("client_id".to_string(), client_id.into());
        application.insert("client_secret".to_string(), client_secret.into());
        lock(&self.applications).insert(client_id.to_string(), application);
    }

    /// Register an existing resource server
    pub fn insert_resource_server(&self, id: &str, identifier: &str) {
        let mut server = Document::new();
        server.insert("id".to_string(), id.into());
        server.insert("identifier".to_string(), identifier.into());
        lock(&self.resource_servers).push(server);
    }

    /// Current client secret of an application
    pub fn client_secret(&self, client_id: &str) -> Option<String> {
        lock(&self.applications)
            .get(client_id)
            .and_then(|app| app.get("client_secret"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
    }

    /// Calls received so far
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    /// Calls that change remote state, in order
    pub fn mutations(&self) -> Vec<ProviderCall> {
        self.calls()
            .into_iter()
            .filter(|call| {
                !matches!(
                    call,
                    ProviderCall::GetApplication(_) | ProviderCall::ListResourceServers { .. }
                )
            })
            .collect()
    }

    fn record(&self, op: ProviderOp, call: ProviderCall) -> Result<()> {
        lock(&self.calls).push(call);
        match lock(&self.failures).get(&op) {
            Some(error) => Err(error.clone().into()),
            None => Ok(()),
        }
    }

    fn check_connection(&self, connection_id: &str) -> Result<()> {
        if lock(&self.failing_connections).contains(connection_id) {
            return Err(RemoteError::new(404, "inexistent_connection", "The connection does not exist").into());
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let n = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        format!("{prefix}_{n}")
    }
}

#[async_trait]
impl IdentityProvider for RecordingProvider {
    async fn create_application(&self, fields: &Document) -> Result<CreatedApplication> {
        self.record(
            ProviderOp::CreateApplication,
            ProviderCall::CreateApplication(fields.clone()),
        )?;
        let client_id = self.next_id("client");
        let client_secret = format!("{client_id}_secret");
        self.insert_application(&client_id, &client_secret);
        Ok(CreatedApplication {
            client_id,
            client_secret,
        })
    }

    async fn update_application(&self, client_id: &str, fields: &Document) -> Result<String> {
        self.record(
            ProviderOp::UpdateApplication,
            ProviderCall::UpdateApplication {
                client_id: client_id.to_string(),
                fields: fields.clone(),
            },
        )?;
        if let Some(application) = lock(&self.applications).get_mut(client_id) {
            for (key, value) in fields {
                application.insert(key.clone(), value.clone());
            }
        }
        Ok(client_id.to_string())
    }

    async fn delete_application(&self, client_id: &str) -> Result<()> {
        self.record(
            ProviderOp::DeleteApplication,
            ProviderCall::DeleteApplication(client_id.to_string()),
        )?;
        lock(&self.applications).remove(client_id);
        Ok(())
    }

    async fn create_api(&self, fields: &Document) -> Result<String> {
        self.record(ProviderOp::CreateApi, ProviderCall::CreateApi(fields.clone()))?;
        Ok(self.next_id("api"))
    }

    async fn update_api(&self, api_id: &str, fields: &Document) -> Result<()> {
        self.record(
            ProviderOp::UpdateApi,
            ProviderCall::UpdateApi {
                api_id: api_id.to_string(),
                fields: fields.clone(),
            },
        )
    }

    async fn delete_api(&self, api_id: &str) -> Result<()> {
        self.record(ProviderOp::DeleteApi, ProviderCall::DeleteApi(api_id.to_string()))
    }

    async fn create_grant(&self, fields: &Document) -> Result<String> {
        self.record(ProviderOp::CreateGrant, ProviderCall::CreateGrant(fields.clone()))?;
        Ok(self.next_id("grant"))
    }

    async fn delete_grant(&self, grant_id: &str) -> Result<()> {
        self.record(ProviderOp::DeleteGrant, ProviderCall::DeleteGrant(grant_id.to_string()))
    }

    async fn add_to_connection(&self, connection_id: &str, client_id: &str) -> Result<()> {
        self.record(
            ProviderOp::AddToConnection,
            ProviderCall::AddToConnection {
                connection_id: connection_id.to_string(),
                client_id: client_id.to_string(),
            },
        )?;
        self.check_connection(connection_id)
    }

    async fn remove_from_connection(&self, connection_id: &str, client_id: &str) -> Result<()> {
        self.record(
            ProviderOp::RemoveFromConnection,
            ProviderCall::RemoveFromConnection {
                connection_id: connection_id.to_string(),
                client_id: client_id.to_string(),
            },
        )?;
        self.check_connection(connection_id)
    }

    async fn rotate_client_secret(&self, client_id: &str) -> Result<String> {
        self.record(
            ProviderOp::RotateClientSecret,
            ProviderCall::RotateClientSecret(client_id.to_string()),
        )?;
        let secret = self.next_id("rotated");
        self.insert_application(client_id, &secret);
        Ok(secret)
    }

    async fn get_application(&self, client_id: &str, fields: &[&str]) -> Result<Document> {
        self.record(
            ProviderOp::GetApplication,
            ProviderCall::GetApplication(client_id.to_string()),
        )?;
        let applications = lock(&self.applications);
        let application = applications
            .get(client_id)
            .ok_or_else(|| RemoteError::new(404, "inexistent_client", "Client not found"))?;
        Ok(application
            .iter()
            .filter(|(key, _)| fields.is_empty() || fields.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect())
    }

    async fn list_resource_servers(&self, page: u32, per_page: u32) -> Result<Vec<Document>> {
        self.record(
            ProviderOp::ListResourceServers,
            ProviderCall::ListResourceServers { page, per_page },
        )?;
        Ok(lock(&self.resource_servers)
            .iter()
            .skip((page * per_page) as usize)
            .take(per_page as usize)
            .cloned()
            .collect())
    }
}

/// Factory handing out one shared provider for every tenant
#[derive(Debug, Clone)]
pub struct StaticProviderFactory {
    provider: Arc<RecordingProvider>,
    tenants: Arc<Mutex<Vec<String>>>,
}

impl StaticProviderFactory {
    /// Factory over `provider`
    pub fn new(provider: Arc<RecordingProvider>) -> Self {
        Self {
            provider,
            tenants: Arc::default(),
        }
    }

    /// Tenants providers were requested for
    pub fn tenants(&self) -> Vec<String> {
        lock(&self.tenants).clone()
    }
}

#[async_trait]
impl ProviderFactory for StaticProviderFactory {
    async fn provider(&self, tenant: &str) -> Result<Arc<dyn IdentityProvider>> {
        lock(&self.tenants).push(tenant.to_string());
        Ok(self.provider.clone())
    }
}

// ============================================================================
// Secret Store
// ============================================================================

/// Secret store verbs, used to inject failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecretOp {
    Get,
    Create,
    Rotate,
    Delete,
    PutValue,
    UpdateStage,
    Describe,
}

#[derive(Debug, Clone, Default)]
struct StoredSecret {
    arn: String,
    kms_key_id: Option<String>,
    tags: Vec<StackTag>,
    rotation: Option<(String, i64)>,
    rotation_enabled: bool,
    versions: BTreeMap<String, String>,
    stages: HashMap<String, Vec<String>>,
}

impl StoredSecret {
    fn version_with_stage(&self, stage: &str) -> Option<&str> {
        self.stages
            .iter()
            .find(|(_, stages)| stages.iter().any(|s| s == stage))
            .map(|(version, _)| version.as_str())
    }

    fn detach_stage(&mut self, stage: &str) {
        for stages in self.stages.values_mut() {
            stages.retain(|s| s != stage);
        }
    }

    fn attach_stage(&mut self, version_id: &str, stage: &str) {
        self.detach_stage(stage);
        self.stages
            .entry(version_id.to_string())
            .or_default()
            .push(stage.to_string());
    }
}

/// Secret store with versions and staging labels kept in memory
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<BTreeMap<String, StoredSecret>>,
    failures: Mutex<HashMap<SecretOp, String>>,
    deleted: Mutex<Vec<(String, bool)>>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret whose single version `v1` is current
    pub fn insert(&self, name: &str, value: impl Into<String>) {
        let mut secret = StoredSecret {
            arn: arn_for(name),
            ..StoredSecret::default()
        };
        secret.versions.insert("v1".to_string(), value.into());
        secret.attach_stage("v1", STAGE_CURRENT);
        lock(&self.secrets).insert(name.to_string(), secret);
    }

    /// Add a version with the given stages to an existing secret
    pub fn insert_version(&self, name: &str, version_id: &str, value: impl Into<String>, stages: &[&str]) {
        if let Some(secret) = lock(&self.secrets).get_mut(name) {
            secret.versions.insert(version_id.to_string(), value.into());
            secret.stages.entry(version_id.to_string()).or_default();
            for stage in stages {
                secret.attach_stage(version_id, stage);
            }
        }
    }

    /// Start a rotation: `token` becomes a pending version without a value
    pub fn begin_rotation(&self, name: &str, token: &str) {
        if let Some(secret) = lock(&self.secrets).get_mut(name) {
            secret.rotation_enabled = true;
            secret.attach_stage(token, STAGE_PENDING);
        }
    }

    /// Turn rotation on or off for a secret
    pub fn set_rotation_enabled(&self, name: &str, enabled: bool) {
        if let Some(secret) = lock(&self.secrets).get_mut(name) {
            secret.rotation_enabled = enabled;
        }
    }

    /// Fail every call of `op` with a service error `code`
    pub fn fail(&self, op: SecretOp, code: &str) {
        lock(&self.failures).insert(op, code.to_string());
    }

    /// Whether a secret exists
    pub fn contains(&self, name: &str) -> bool {
        lock(&self.secrets).contains_key(name)
    }

    /// Value of the version holding `stage`
    pub fn value(&self, name: &str, stage: &str) -> Option<String> {
        let secrets = lock(&self.secrets);
        let secret = secrets.get(name)?;
        let version = secret.version_with_stage(stage)?;
        secret.versions.get(version).cloned()
    }

    /// Stages attached to a version
    pub fn stages(&self, name: &str, version_id: &str) -> Vec<String> {
        lock(&self.secrets)
            .get(name)
            .and_then(|secret| secret.stages.get(version_id).cloned())
            .unwrap_or_default()
    }

    /// Rotation function and schedule configured for a secret
    pub fn rotation(&self, name: &str) -> Option<(String, i64)> {
        lock(&self.secrets).get(name).and_then(|s| s.rotation.clone())
    }

    /// Tags a secret was created with
    pub fn tags(&self, name: &str) -> Vec<StackTag> {
        lock(&self.secrets)
            .get(name)
            .map(|s| s.tags.clone())
            .unwrap_or_default()
    }

    /// KMS key a secret was created with
    pub fn kms_key_id(&self, name: &str) -> Option<String> {
        lock(&self.secrets).get(name).and_then(|s| s.kms_key_id.clone())
    }

    /// Deleted secret ids with their force flag
    pub fn deleted(&self) -> Vec<(String, bool)> {
        lock(&self.deleted).clone()
    }

    fn check(&self, op: SecretOp) -> Result<()> {
        match lock(&self.failures).get(&op) {
            Some(code) => Err(SecretStoreError::new(code.clone(), format!("injected {code}")).into()),
            None => Ok(()),
        }
    }

    fn with_secret<T>(
        &self,
        secret_id: &str,
        f: impl FnOnce(&str, &mut StoredSecret) -> Result<T>,
    ) -> Result<T> {
        let mut secrets = lock(&self.secrets);
        let name = resolve_name(&secrets, secret_id).ok_or_else(|| not_found(secret_id))?;
        let secret = secrets.get_mut(&name).ok_or_else(|| not_found(secret_id))?;
        f(&name, secret)
    }
}

fn arn_for(name: &str) -> String {
    format!("arn:aws:secretsmanager:us-east-1:000000000000:secret:{name}")
}

fn resolve_name(secrets: &BTreeMap<String, StoredSecret>, secret_id: &str) -> Option<String> {
    if secrets.contains_key(secret_id) {
        return Some(secret_id.to_string());
    }
    secrets
        .iter()
        .find(|(_, secret)| secret.arn == secret_id)
        .map(|(name, _)| name.clone())
}

fn not_found(secret_id: &str) -> Error {
    SecretStoreError::new(
        "ResourceNotFoundException",
        format!("Secrets Manager can't find the specified secret: {secret_id}"),
    )
    .into()
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, secret_id: &str, stage: &str) -> Result<SecretRecord> {
        self.check(SecretOp::Get)?;
        self.with_secret(secret_id, |name, secret| {
            let version = secret
                .version_with_stage(stage)
                .ok_or_else(|| not_found(secret_id))?
                .to_string();
            let value = secret.versions.get(&version).cloned().unwrap_or_default();
            Ok(SecretRecord {
                arn: secret.arn.clone(),
                name: name.to_string(),
                version_id: Some(version),
                value: SecretValue::Text(value),
            })
        })
    }

    async fn create_secret(&self, request: CreateSecretRequest) -> Result<SecretRef> {
        self.check(SecretOp::Create)?;
        if self.contains(&request.name) {
            return Err(SecretStoreError::new(
                "ResourceExistsException",
                format!("secret {} already exists", request.name),
            )
            .into());
        }
        self.insert(&request.name, request.value);
        self.with_secret(&request.name, |name, secret| {
            secret.kms_key_id = request.kms_key_id;
            secret.tags = request.tags;
            Ok(SecretRef {
                arn: secret.arn.clone(),
                name: name.to_string(),
            })
        })
    }

    async fn rotate_secret(&self, secret_id: &str, rotation_arn: &str, days: i64) -> Result<()> {
        self.check(SecretOp::Rotate)?;
        self.with_secret(secret_id, |_, secret| {
            secret.rotation = Some((rotation_arn.to_string(), days));
            secret.rotation_enabled = true;
            Ok(())
        })
    }

    async fn delete_secret(&self, secret_id: &str, force: bool) -> Result<()> {
        self.check(SecretOp::Delete)?;
        let name = resolve_name(&lock(&self.secrets), secret_id).ok_or_else(|| not_found(secret_id))?;
        lock(&self.secrets).remove(&name);
        lock(&self.deleted).push((name, force));
        Ok(())
    }

    async fn put_secret_value(
        &self,
        secret_id: &str,
        token: &str,
        value: &str,
        stage: &str,
    ) -> Result<()> {
        self.check(SecretOp::PutValue)?;
        self.with_secret(secret_id, |_, secret| {
            if secret.versions.contains_key(token) {
                return Err(SecretStoreError::new(
                    "ResourceExistsException",
                    format!("version {token} already exists"),
                )
                .into());
            }
            secret.versions.insert(token.to_string(), value.to_string());
            secret.attach_stage(token, stage);
            Ok(())
        })
    }

    async fn update_secret_version_stage(
        &self,
        secret_id: &str,
        stage: &str,
        move_to: &str,
        remove_from: Option<&str>,
    ) -> Result<()> {
        self.check(SecretOp::UpdateStage)?;
        self.with_secret(secret_id, |_, secret| {
            if !secret.versions.contains_key(move_to) {
                return Err(not_found(move_to));
            }
            if let Some(previous) = remove_from {
                if stage == STAGE_CURRENT {
                    secret.attach_stage(previous, STAGE_PREVIOUS);
                }
            }
            secret.attach_stage(move_to, stage);
            Ok(())
        })
    }

    async fn describe_secret(&self, secret_id: &str) -> Result<SecretMetadata> {
        self.check(SecretOp::Describe)?;
        self.with_secret(secret_id, |_, secret| {
            Ok(SecretMetadata {
                rotation_enabled: secret.rotation_enabled,
                version_ids_to_stages: secret.stages.clone(),
            })
        })
    }
}

// ============================================================================
// Parameter Store
// ============================================================================

/// Parameter store kept in memory
#[derive(Debug, Default)]
pub struct MemoryParameterStore {
    parameters: Mutex<BTreeMap<String, String>>,
    fail_puts: Mutex<bool>,
}

impl MemoryParameterStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write fail
    pub fn fail_puts(&self) {
        *lock(&self.fail_puts) = true;
    }

    /// Stored value of a parameter
    pub fn get(&self, name: &str) -> Option<String> {
        lock(&self.parameters).get(name).cloned()
    }

    /// Add a parameter
    pub fn insert(&self, name: &str, value: &str) {
        lock(&self.parameters).insert(name.to_string(), value.to_string());
    }
}

#[async_trait]
impl ParameterStore for MemoryParameterStore {
    async fn put_secure_string(&self, name: &str, value: &str) -> Result<()> {
        if *lock(&self.fail_puts) {
            return Err(Error::parameter_store(format!("AccessDeniedException: {name}")));
        }
        self.insert(name, value);
        Ok(())
    }

    async fn delete(&self, name: &str) -> Result<()> {
        lock(&self.parameters)
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::parameter_store(format!("ParameterNotFound: {name}")))
    }
}

// ============================================================================
// Stack Service
// ============================================================================

/// Stack with fixed tags and a scripted event history
#[derive(Debug, Default)]
pub struct StaticStack {
    tags: Vec<StackTag>,
    events: Mutex<Vec<StackEvent>>,
    fail_events: Mutex<bool>,
    event_reads: AtomicU32,
}

impl StaticStack {
    /// Stack carrying `tags`
    pub fn new(tags: Vec<StackTag>) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Replace the event history (most recent first)
    pub fn set_events(&self, events: Vec<StackEvent>) {
        *lock(&self.events) = events;
    }

    /// Make event listing fail
    pub fn fail_events(&self) {
        *lock(&self.fail_events) = true;
    }

    /// Number of times the event history was read
    pub fn event_reads(&self) -> u32 {
        self.event_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StackInspector for StaticStack {
    async fn stack_tags(&self, _stack_id: &str) -> Result<Vec<StackTag>> {
        Ok(self.tags.clone())
    }

    async fn stack_events(&self, stack_id: &str) -> Result<Vec<StackEvent>> {
        self.event_reads.fetch_add(1, Ordering::SeqCst);
        if *lock(&self.fail_events) {
            return Err(Error::stack(format!("Stack {stack_id} does not exist")));
        }
        Ok(lock(&self.events).clone())
    }
}
