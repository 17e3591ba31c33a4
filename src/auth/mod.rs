//! Management API credentials
//!
//! Tokens for the management API come from the tenant's client credentials
//! grant and are reused until 30 seconds before they expire.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AccessToken, AuthConfig, ClientCredentials};
