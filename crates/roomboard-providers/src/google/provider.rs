//! [`DirectorySource`] and [`FreeBusySource`] backed by Google Workspace.

use std::sync::Arc;

use roomboard_core::{Room, TimeWindow};
use tracing::debug;

use super::client::WorkspaceClient;
use super::config::GoogleConfig;
use crate::error::ProviderResult;
use crate::source::{BoxFuture, BusyMap, DirectorySource, FreeBusySource};

/// Hard limit on calendars per `freeBusy.query` request.
const FREE_BUSY_MAX_CALENDARS: usize = 50;

/// Google Workspace provider.
///
/// Cheap to clone; clones share the HTTP client and token cache.
#[derive(Debug, Clone)]
pub struct GoogleWorkspace {
    client: Arc<WorkspaceClient>,
    customer: String,
}

impl GoogleWorkspace {
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        let client = WorkspaceClient::new(&config).map_err(|e| e.with_provider("google"))?;
        Ok(Self {
            client: Arc::new(client),
            customer: config.customer,
        })
    }
}

impl DirectorySource for GoogleWorkspace {
    fn name(&self) -> &str {
        "google"
    }

    fn list_rooms(&self) -> BoxFuture<'_, ProviderResult<Vec<Room>>> {
        Box::pin(async move {
            let resources = self
                .client
                .list_calendar_resources(&self.customer)
                .await
                .map_err(|e| e.with_provider("google"))?;
            let rooms: Vec<Room> = resources
                .into_iter()
                .map(|resource| resource.into_room())
                .collect();
            debug!(count = rooms.len(), customer = %self.customer, "directory rooms");
            Ok(rooms)
        })
    }
}

impl FreeBusySource for GoogleWorkspace {
    fn name(&self) -> &str {
        "google"
    }

    fn query_free_busy<'a>(
        &'a self,
        addresses: &'a [String],
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<BusyMap>> {
        Box::pin(async move {
            self.client
                .query_free_busy(addresses, window)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }

    fn max_batch_size(&self) -> usize {
        FREE_BUSY_MAX_CALENDARS
    }
}
