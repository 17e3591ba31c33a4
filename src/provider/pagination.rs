//! Resource server lookup by identifier
//!
//! The management API has no filter for resource servers, so lookups walk
//! the page-numbered listing. When the tenant has a single page the API
//! keeps returning it for every page number, which is why a repeated page
//! ends the walk.

use super::IdentityProvider;
use crate::error::Result;
use crate::types::{Document, JsonValue};
use std::time::Duration;
use tracing::debug;

/// Resource servers requested per page
pub const PAGE_SIZE: u32 = 50;

/// Most pages fetched by one walk
pub const PAGE_LIMIT: u32 = 60;

/// Outcome of processing one page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageScan {
    /// Fetch the next page
    Continue,
    /// Stop walking
    Done,
}

/// Position of a page walk
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    /// Page to fetch next
    pub page: u32,
    /// Pages received so far
    pub pages_fetched: u32,
    previous: Option<Vec<Document>>,
}

impl ScanState {
    /// Record a fetched page. Empty and repeated pages end the walk.
    pub fn observe(&mut self, items: &[Document]) -> PageScan {
        self.pages_fetched += 1;
        if self.previous.as_deref() == Some(items) || items.is_empty() {
            return PageScan::Done;
        }
        self.previous = Some(items.to_vec());
        PageScan::Continue
    }

    /// Move to the next page unless `PAGE_LIMIT` pages have been fetched
    pub fn advance(&mut self) -> PageScan {
        self.page += 1;
        if self.page >= PAGE_LIMIT {
            PageScan::Done
        } else {
            PageScan::Continue
        }
    }
}

/// Id of the resource server whose identifier is `identifier`, if any
pub async fn find_resource_server(
    provider: &dyn IdentityProvider,
    identifier: &str,
    page_delay: Duration,
) -> Result<Option<String>> {
    let mut state = ScanState::default();

    loop {
        let items = provider.list_resource_servers(state.page, PAGE_SIZE).await?;
        if state.observe(&items) == PageScan::Done {
            break;
        }

        let found = items
            .iter()
            .filter(|server| server.get("identifier").and_then(JsonValue::as_str) == Some(identifier))
            .find_map(|server| server.get("id").and_then(JsonValue::as_str));
        if let Some(id) = found {
            debug!(identifier, id, pages = state.pages_fetched, "Resource server found");
            return Ok(Some(id.to_string()));
        }

        if state.advance() == PageScan::Done {
            break;
        }
        tokio::time::sleep(page_delay).await;
    }

    debug!(identifier, pages = state.pages_fetched, "Resource server not found");
    Ok(None)
}
