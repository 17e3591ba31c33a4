// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # Authn Custom Resource
//!
//! Reconciles `Custom::Authn_Application`, `Custom::Authn_Api` and
//! `Custom::Authn_Grant` stack resources against an Auth0 tenant's
//! management API, and rotates the managed secrets of machine-to-machine
//! applications.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use authn_cr::dispatch::{LifecycleDispatcher, LifecycleEvent};
//!
//! let dispatcher = LifecycleDispatcher::new(services);
//! let event: LifecycleEvent = serde_json::from_str(&raw)?;
//! let response = dispatcher.handle(&event).await?;
//! println!("{}", response.physical_resource_id);
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      LifecycleDispatcher                        │
//! │   Create / Update / Delete  →  Reconciler   (+ create poll)     │
//! └─────────────────────────────────────────────────────────────────┘
//!                                │
//! ┌──────────────┬───────────────┴──────────┬───────────────────────┐
//! │  Validation  │       Reconcilers        │      Collaborators    │
//! ├──────────────┼──────────────────────────┼───────────────────────┤
//! │ Schemas      │ Application              │ IdentityProvider      │
//! │ Coercion     │ Api                      │ SecretStore           │
//! │ Defaults     │ Grant                    │ ParameterStore        │
//! │ Dependencies │ Connections              │ StackInspector        │
//! └──────────────┴──────────────────────────┴───────────────────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(missing_docs)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// Runtime settings
pub mod config;

/// Management API authentication
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Declarative schema validation
pub mod validation;

/// Resource property schemas
pub mod schemas;

/// Secret store, parameter store and stack service
pub mod cloud;

/// Identity provider management API
pub mod provider;

/// Per-kind resource reconcilers
pub mod reconcile;

/// Lifecycle event dispatch
pub mod dispatch;

/// Managed secret rotation
pub mod rotation;

/// Command-line interface
pub mod cli;

/// In-memory collaborators for tests
pub mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use types::*;

pub use dispatch::{LifecycleDispatcher, LifecycleEvent, LifecycleResponse, RequestType};
pub use reconcile::Services;
pub use rotation::{RotationEvent, SecretRotator};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
