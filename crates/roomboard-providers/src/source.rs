//! Collaborator contracts consumed by the occupancy engine.
//!
//! - [`DirectorySource`] lists the rooms (slow cadence)
//! - [`FreeBusySource`] returns busy intervals for calendar addresses (fast
//!   cadence, rate limited)
//!
//! Both traits return boxed futures so they stay object-safe and can be held
//! as `Arc<dyn ...>` by the server.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use roomboard_core::{BusyInterval, Room, TimeWindow};

use crate::error::{ProviderError, ProviderResult};

/// A boxed future for async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Busy intervals keyed by calendar address.
pub type BusyMap = HashMap<String, Vec<BusyInterval>>;

/// Source of the room list.
pub trait DirectorySource: Send + Sync {
    /// Returns the name of this source (e.g. "google", "static").
    fn name(&self) -> &str;

    /// Lists every room known to the directory.
    fn list_rooms(&self) -> BoxFuture<'_, ProviderResult<Vec<Room>>>;
}

/// Source of free/busy data.
pub trait FreeBusySource: Send + Sync {
    /// Returns the name of this source.
    fn name(&self) -> &str;

    /// Queries busy intervals for `addresses` within `window`.
    ///
    /// Addresses absent from the returned map have no busy intervals.
    /// Implementations do not retry; callers decide based on
    /// [`ProviderError::is_retryable`].
    fn query_free_busy<'a>(
        &'a self,
        addresses: &'a [String],
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<BusyMap>>;

    /// Largest number of addresses accepted in one query.
    fn max_batch_size(&self) -> usize {
        50
    }
}

/// A source that fails every call with a fixed message.
///
/// Stands in for a provider that could not be initialised, so the server
/// can still start and report the failure through `lastError`.
#[derive(Debug, Clone)]
pub struct UnavailableSource {
    name: String,
    reason: String,
}

impl UnavailableSource {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }

    fn error(&self) -> ProviderError {
        ProviderError::configuration(self.reason.clone()).with_provider(self.name.clone())
    }
}

impl DirectorySource for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn list_rooms(&self) -> BoxFuture<'_, ProviderResult<Vec<Room>>> {
        let err = self.error();
        Box::pin(async move { Err(err) })
    }
}

impl FreeBusySource for UnavailableSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn query_free_busy<'a>(
        &'a self,
        _addresses: &'a [String],
        _window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<BusyMap>> {
        let err = self.error();
        Box::pin(async move { Err(err) })
    }
}
