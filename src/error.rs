//! Crate-wide error type
//!
//! Remote failures are classified into kinds (`RemoteErrorKind`,
//! `SecretErrorKind`) so that reconcilers can match on them instead of
//! inspecting messages.

use crate::validation::ValidationErrors;
use serde::Deserialize;
use thiserror::Error;

/// Substring the management API puts in the message of an identifier that
/// does not parse as a valid resource id.
pub const PATH_VALIDATION_ERROR: &str = "Path validation error";

/// The main error type
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // ============================================================================
    // Authentication Errors
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("OAuth2 error: {message}")]
    OAuth2 { message: String },

    // ============================================================================
    // HTTP Errors
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    // ============================================================================
    // Validation Errors
    // ============================================================================
    #[error("Validation failed: {errors}")]
    Validation { errors: ValidationErrors },

    // ============================================================================
    // Remote Service Errors
    // ============================================================================
    #[error("Identity provider error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Secret store error: {0}")]
    SecretStore(#[from] SecretStoreError),

    #[error("Parameter store error: {message}")]
    ParameterStore { message: String },

    #[error("Stack service error: {message}")]
    Stack { message: String },

    // ============================================================================
    // Lifecycle Errors
    // ============================================================================
    #[error("{resource_type} not a valid name in {known}")]
    UnknownResourceType { resource_type: String, known: String },

    #[error("Changing Type is not supported ({from} -> {to}). Create a new resource and remove the old one instead")]
    TypeChangeNotSupported { from: String, to: String },

    #[error("failed to add: {failed_add:?}, failed to delete: {failed_remove:?}")]
    ConnectionMembership {
        failed_add: Vec<String>,
        failed_remove: Vec<String>,
    },

    #[error("Rotation error: {message}")]
    Rotation { message: String },

    #[error("Malformed secret '{secret_id}': {message}")]
    MalformedSecret { secret_id: String, message: String },

    // ============================================================================
    // I/O Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create an auth error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create an HTTP status error
    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    /// Create a parameter store error
    pub fn parameter_store(message: impl Into<String>) -> Self {
        Self::ParameterStore {
            message: message.into(),
        }
    }

    /// Create a stack service error
    pub fn stack(message: impl Into<String>) -> Self {
        Self::Stack {
            message: message.into(),
        }
    }

    /// Create a rotation error
    pub fn rotation(message: impl Into<String>) -> Self {
        Self::Rotation {
            message: message.into(),
        }
    }

    /// Create a malformed secret error
    pub fn malformed_secret(secret_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSecret {
            secret_id: secret_id.into(),
            message: message.into(),
        }
    }

    /// Classification of an identity provider failure, if this is one
    pub fn remote_kind(&self) -> Option<RemoteErrorKind> {
        match self {
            Error::Remote(remote) => Some(remote.kind()),
            _ => None,
        }
    }

    /// The remote API rejected the identifier as not resolving to a resource
    pub fn is_invalid_identifier(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::InvalidIdentifier)
    }

    /// The remote API reported a duplicate creation
    pub fn is_conflict(&self) -> bool {
        self.remote_kind() == Some(RemoteErrorKind::Conflict)
    }

    /// Classification of a secret store failure, if this is one
    pub fn secret_kind(&self) -> Option<SecretErrorKind> {
        match self {
            Error::SecretStore(err) => Some(err.kind()),
            _ => None,
        }
    }

    /// Check if this error is retryable at the transport level
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(_) | Error::RateLimited { .. } | Error::Timeout { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::Remote(remote) => is_retryable_status(remote.status_code),
            _ => false,
        }
    }
}

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

// ============================================================================
// Identity provider errors
// ============================================================================

/// How a reconciler should treat a failed identity provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// The identifier does not resolve to a real resource
    InvalidIdentifier,
    /// Duplicate creation
    Conflict,
    /// Anything else
    Other,
}

/// Error reported by the identity management API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status_code}: {message}")]
pub struct RemoteError {
    /// HTTP status code
    pub status_code: u16,
    /// Machine readable error code (e.g. `invalid_uri`)
    pub error_code: String,
    /// Human readable message
    pub message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteErrorBody {
    #[serde(default)]
    error_code: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RemoteError {
    /// Create a new remote error
    pub fn new(status_code: u16, error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status_code,
            error_code: error_code.into(),
            message: message.into(),
        }
    }

    /// Build from an HTTP status and the raw response body
    pub fn from_response(status_code: u16, body: &str) -> Self {
        match serde_json::from_str::<RemoteErrorBody>(body) {
            Ok(parsed) => Self {
                status_code,
                error_code: parsed
                    .error_code
                    .or(parsed.error)
                    .unwrap_or_default(),
                message: parsed.message.unwrap_or_else(|| body.to_string()),
            },
            Err(_) => Self::new(status_code, "", body),
        }
    }

    /// Classify this error.
    ///
    /// The API exposes no structured code for malformed identifiers, so the
    /// message is matched on [`PATH_VALIDATION_ERROR`].
    pub fn kind(&self) -> RemoteErrorKind {
        if self.message.contains(PATH_VALIDATION_ERROR) {
            RemoteErrorKind::InvalidIdentifier
        } else if self.status_code == 409 {
            RemoteErrorKind::Conflict
        } else {
            RemoteErrorKind::Other
        }
    }
}

// ============================================================================
// Secret store errors
// ============================================================================

/// Classification of a secret store failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretErrorKind {
    AccessDenied,
    NotFound,
    ResourceExists,
    Other,
}

/// Error reported by the secret store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct SecretStoreError {
    /// Service error code (e.g. `ResourceNotFoundException`)
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl SecretStoreError {
    /// Create a new secret store error
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classify this error by its service code
    pub fn kind(&self) -> SecretErrorKind {
        match self.code.as_str() {
            "AccessDeniedException" => SecretErrorKind::AccessDenied,
            "ResourceNotFoundException" => SecretErrorKind::NotFound,
            "ResourceExistsException" => SecretErrorKind::ResourceExists,
            _ => SecretErrorKind::Other,
        }
    }
}
