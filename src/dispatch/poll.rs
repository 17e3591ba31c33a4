//! Failure detection after a create
//!
//! After a create the dispatcher reads the stack's event history and tears
//! the new resource down when the stack operation is failing.

use crate::cloud::{StackEvent, StackInspector};
use crate::config::Settings;
use crate::error::Result;
use tracing::debug;

/// Statuses that mean the current stack operation failed
const FAILURE_STATUSES: [&str; 2] = ["CREATE_FAILED", "UPDATE_ROLLBACK_IN_PROGRESS"];

/// Reason attached to the event that started the current stack operation
const USER_INITIATED: &str = "User Initiated";

/// Whether the current stack operation is failing.
///
/// `events` are most recent first. The scan stops at the first user
/// initiated event, so failures of earlier operations are ignored.
pub fn stack_is_failing(events: &[StackEvent]) -> bool {
    let mut failed = false;
    for event in events {
        if event
            .resource_status
            .as_deref()
            .is_some_and(|status| FAILURE_STATUSES.contains(&status))
        {
            failed = true;
        }
        if event.resource_status_reason.as_deref() == Some(USER_INITIATED) {
            break;
        }
    }
    failed
}

/// Watch the stack after a create, returning whether it is failing
pub async fn watch_create(
    stacks: &dyn StackInspector,
    settings: &Settings,
    stack_id: &str,
) -> Result<bool> {
    for attempt in 1..=settings.poll_attempts {
        tokio::time::sleep(settings.poll_interval()).await;
        let events = stacks.stack_events(stack_id).await?;
        if stack_is_failing(&events) {
            return Ok(true);
        }
        debug!(stack_id, attempt, "Stack is not failing");
    }
    Ok(false)
}
