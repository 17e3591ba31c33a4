//! Connection membership
//!
//! Applications are enabled on shared connections one membership at a
//! time, so unrelated members of a connection are never touched.

use crate::error::{Error, Result};
use crate::provider::IdentityProvider;
use futures::future::join_all;
use std::collections::BTreeSet;
use tracing::{error, info};

/// Memberships to add and remove
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionChanges {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl ConnectionChanges {
    /// Set difference between the previous and the desired connections
    pub fn between(previous: &[String], desired: &[String]) -> Self {
        let previous: BTreeSet<&String> = previous.iter().collect();
        let desired: BTreeSet<&String> = desired.iter().collect();
        Self {
            add: desired.difference(&previous).map(|c| (*c).clone()).collect(),
            remove: previous.difference(&desired).map(|c| (*c).clone()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// Enable `client_id` on every connection, returning the ones that failed
pub async fn enable_all(
    provider: &dyn IdentityProvider,
    connections: &[String],
    client_id: &str,
) -> Vec<String> {
    let results = join_all(
        connections
            .iter()
            .map(|connection| provider.add_to_connection(connection, client_id)),
    )
    .await;
    failed(connections, results, "enable")
}

async fn disable_all(
    provider: &dyn IdentityProvider,
    connections: &[String],
    client_id: &str,
) -> Vec<String> {
    let results = join_all(
        connections
            .iter()
            .map(|connection| provider.remove_from_connection(connection, client_id)),
    )
    .await;
    failed(connections, results, "disable")
}

fn failed(connections: &[String], results: Vec<Result<()>>, action: &str) -> Vec<String> {
    connections
        .iter()
        .zip(results)
        .filter_map(|(connection, result)| match result {
            Ok(()) => None,
            Err(err) => {
                error!(connection = %connection, error = %err, "Failed to {action} connection");
                Some(connection.clone())
            }
        })
        .collect()
}

/// Apply membership changes. Every change is attempted; failures are
/// reported together.
pub async fn apply_changes(
    provider: &dyn IdentityProvider,
    changes: &ConnectionChanges,
    client_id: &str,
) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    info!(
        client_id,
        add = ?changes.add,
        remove = ?changes.remove,
        "Updating connections"
    );

    let failed_add = enable_all(provider, &changes.add, client_id).await;
    let failed_remove = disable_all(provider, &changes.remove, client_id).await;

    if failed_add.is_empty() && failed_remove.is_empty() {
        Ok(())
    } else {
        Err(Error::ConnectionMembership {
            failed_add,
            failed_remove,
        })
    }
}
