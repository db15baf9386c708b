//! Read-through occupancy cache.
//!
//! Two independent slots are kept:
//!
//! | slot   | value            | freshness window                  |
//! |--------|------------------|-----------------------------------|
//! | rooms  | `Arc<Vec<Room>>` | `max(poll * 10, 300s)`            |
//! | status | `StatusPayload`  | `poll`                            |
//!
//! A stale or missing slot is refreshed on demand. When the refresh fails
//! the previous value is served (stale-serve) and the failure is recorded in
//! the process-wide last error, which every payload carries. Only the
//! read-check and the write-back take the state lock; upstream calls run
//! outside it, behind a per-slot gate so at most one refresh per slot is in
//! flight.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use roomboard_core::{Room, derive_all, query_window};
use roomboard_protocol::{RoomsPayload, StatusPayload};
use roomboard_providers::DirectorySource;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::fetcher::RetryingFetcher;

/// Prefix of last-error messages caused by the directory.
pub const ROOMS_ERROR_PREFIX: &str = "ROOMS_ERROR";

/// Prefix of last-error messages caused by free/busy queries.
pub const STATUS_ERROR_PREFIX: &str = "STATUS_ERROR";

/// A cached value and when it was fetched (monotonic clock).
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> CacheEntry<T> {
    pub fn new(value: T, fetched_at: Instant) -> Self {
        Self { value, fetched_at }
    }

    /// Age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.fetched_at)
    }

    /// Returns true if `now - fetched_at < max_age`.
    pub fn is_fresh(&self, now: Instant, max_age: Duration) -> bool {
        self.age(now) < max_age
    }
}

/// Cache slot names, used in errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Rooms,
    Status,
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rooms => f.write_str("rooms"),
            Self::Status => f.write_str("status"),
        }
    }
}

/// A refresh failed and there was no previous value to serve.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("no cached {slot} to fall back on: {message}")]
    NoFallback { slot: Slot, message: String },
}

/// Settings that shape the cache and its payloads.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Status freshness window; also reported as `refreshSeconds`.
    pub poll_interval: Duration,
    /// Room-list freshness window.
    pub rooms_ttl: Duration,
    /// "Soon" horizon.
    pub soon: Duration,
    pub default_building_id: String,
}

impl CacheSettings {
    /// Settings for `poll_interval`, with the room TTL derived from it.
    pub fn new(poll_interval: Duration, soon: Duration) -> Self {
        Self {
            poll_interval,
            rooms_ttl: poll_interval.saturating_mul(10).max(Duration::from_secs(300)),
            soon,
            default_building_id: String::new(),
        }
    }

    /// Builder: set the dashboard's default building.
    pub fn with_default_building(mut self, building_id: impl Into<String>) -> Self {
        self.default_building_id = building_id.into();
        self
    }

    /// Builder: override the room-list TTL.
    pub fn with_rooms_ttl(mut self, ttl: Duration) -> Self {
        self.rooms_ttl = ttl;
        self
    }
}

#[derive(Debug, Default)]
struct CacheState {
    rooms: Option<CacheEntry<Arc<Vec<Room>>>>,
    status: Option<CacheEntry<StatusPayload>>,
    last_error: Option<String>,
}

/// Why a status refresh produced nothing.
enum RefreshFailure {
    /// The room list was unavailable; last error already records it.
    Rooms(CacheError),
    /// Every free/busy batch failed.
    Upstream(String),
}

/// The occupancy cache.
pub struct OccupancyCache {
    directory: Arc<dyn DirectorySource>,
    fetcher: RetryingFetcher,
    settings: CacheSettings,
    state: Mutex<CacheState>,
    rooms_gate: tokio::sync::Mutex<()>,
    status_gate: tokio::sync::Mutex<()>,
}

impl fmt::Debug for OccupancyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OccupancyCache")
            .field("directory", &self.directory.name())
            .field("fetcher", &self.fetcher)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl OccupancyCache {
    pub fn new(
        directory: Arc<dyn DirectorySource>,
        fetcher: RetryingFetcher,
        settings: CacheSettings,
    ) -> Self {
        Self {
            directory,
            fetcher,
            settings,
            state: Mutex::new(CacheState::default()),
            rooms_gate: tokio::sync::Mutex::new(()),
            status_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The most recent fetch failure, if any.
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    /// Returns the room list, refreshing it when stale.
    pub async fn rooms(&self) -> Result<Arc<Vec<Room>>, CacheError> {
        if let Some(rooms) = self.fresh_rooms() {
            debug!(slot = %Slot::Rooms, "cache hit");
            return Ok(rooms);
        }

        let _gate = self.rooms_gate.lock().await;
        if let Some(rooms) = self.fresh_rooms() {
            debug!(slot = %Slot::Rooms, "refreshed by a concurrent request");
            return Ok(rooms);
        }

        match self.directory.list_rooms().await {
            Ok(rooms) => {
                let rooms = Arc::new(rooms);
                let mut state = self.lock_state();
                state.rooms = Some(CacheEntry::new(rooms.clone(), Instant::now()));
                state.last_error = None;
                info!(count = rooms.len(), source = self.directory.name(), "room list refreshed");
                Ok(rooms)
            }
            Err(err) => {
                let message = format!("{ROOMS_ERROR_PREFIX}: {err}");
                let mut state = self.lock_state();
                state.last_error = Some(message.clone());
                match state.rooms.as_ref() {
                    Some(entry) => {
                        warn!(
                            error = %err,
                            age_secs = entry.age(Instant::now()).as_secs(),
                            "room list refresh failed, serving cached rooms"
                        );
                        Ok(entry.value.clone())
                    }
                    None => {
                        error!(error = %err, "room list refresh failed with nothing cached");
                        Err(CacheError::NoFallback {
                            slot: Slot::Rooms,
                            message,
                        })
                    }
                }
            }
        }
    }

    /// Returns the room list as served by `GET /api/rooms`.
    pub async fn rooms_payload(&self) -> Result<RoomsPayload, CacheError> {
        let rooms = self.rooms().await?;
        Ok(RoomsPayload::new(rooms.as_ref().clone(), self.last_error()))
    }

    /// Returns the status payload, refreshing it when stale.
    ///
    /// The payload always carries the current last error.
    pub async fn status(&self) -> Result<StatusPayload, CacheError> {
        if let Some(payload) = self.fresh_status() {
            debug!(slot = %Slot::Status, "cache hit");
            return Ok(payload);
        }

        let _gate = self.status_gate.lock().await;
        if let Some(payload) = self.fresh_status() {
            debug!(slot = %Slot::Status, "refreshed by a concurrent request");
            return Ok(payload);
        }

        match self.refresh_status().await {
            Ok(payload) => Ok(payload),
            Err(failure) => self.stale_status(failure),
        }
    }

    /// Refreshes the status slot regardless of freshness.
    ///
    /// Used by the background warmer. Returns the failure message when the
    /// refresh failed, even if a stale value remains cached.
    pub async fn warm(&self) -> Result<(), String> {
        let _gate = self.status_gate.lock().await;
        match self.refresh_status().await {
            Ok(_) => Ok(()),
            Err(RefreshFailure::Rooms(err)) => Err(err.to_string()),
            Err(RefreshFailure::Upstream(message)) => Err(message),
        }
    }

    /// Computes a new status payload and stores it. Caller holds the status gate.
    async fn refresh_status(&self) -> Result<StatusPayload, RefreshFailure> {
        let rooms = self.rooms().await.map_err(RefreshFailure::Rooms)?;

        let now = Utc::now();
        let soon = chrono::Duration::from_std(self.settings.soon)
            .unwrap_or_else(|_| chrono::Duration::minutes(10));
        let window = query_window(now, soon);

        let mut seen = HashSet::new();
        let addresses: Vec<String> = rooms
            .iter()
            .filter_map(Room::resolvable_calendar)
            .filter(|address| seen.insert(*address))
            .map(str::to_string)
            .collect();

        let report = match self.fetcher.fetch(&addresses, window).await {
            Ok(report) => report,
            Err(err) => {
                let message = format!("{STATUS_ERROR_PREFIX}: {err}");
                self.lock_state().last_error = Some(message.clone());
                return Err(RefreshFailure::Upstream(message));
            }
        };

        let items = derive_all(&rooms, &report.busy, now, soon);
        let busy_now = items.iter().filter(|s| s.is_busy_now).count();

        let mut state = self.lock_state();
        if report.is_partial() {
            state.last_error = Some(format!(
                "{STATUS_ERROR_PREFIX}: {}",
                report.warnings.join("; ")
            ));
        } else if state
            .last_error
            .as_deref()
            .is_some_and(|e| e.starts_with(STATUS_ERROR_PREFIX))
        {
            state.last_error = None;
        }

        let payload = StatusPayload {
            generated_at: now,
            refresh_seconds: self.settings.poll_interval.as_secs(),
            soon_minutes: self.settings.soon.as_secs() / 60,
            default_building_id: self.settings.default_building_id.clone(),
            items,
            last_error: None,
        };
        state.status = Some(CacheEntry::new(payload.clone(), Instant::now()));
        let last_error = state.last_error.clone();
        drop(state);

        info!(
            rooms = payload.items.len(),
            busy_now,
            failed_batches = report.failed_batches,
            "status refreshed"
        );
        Ok(payload.with_last_error(last_error))
    }

    fn stale_status(&self, failure: RefreshFailure) -> Result<StatusPayload, CacheError> {
        let state = self.lock_state();
        let message = match failure {
            RefreshFailure::Rooms(CacheError::NoFallback { message, .. }) => message,
            RefreshFailure::Upstream(message) => message,
        };
        match state.status.as_ref() {
            Some(entry) => {
                warn!(
                    error = %message,
                    age_secs = entry.age(Instant::now()).as_secs(),
                    "status refresh failed, serving cached status"
                );
                Ok(entry.value.clone().with_last_error(state.last_error.clone()))
            }
            None => {
                error!(error = %message, "status refresh failed with nothing cached");
                Err(CacheError::NoFallback {
                    slot: Slot::Status,
                    message,
                })
            }
        }
    }

    fn fresh_rooms(&self) -> Option<Arc<Vec<Room>>> {
        let state = self.lock_state();
        state
            .rooms
            .as_ref()
            .filter(|entry| entry.is_fresh(Instant::now(), self.settings.rooms_ttl))
            .map(|entry| entry.value.clone())
    }

    fn fresh_status(&self) -> Option<StatusPayload> {
        let state = self.lock_state();
        state
            .status
            .as_ref()
            .filter(|entry| entry.is_fresh(Instant::now(), self.settings.poll_interval))
            .map(|entry| entry.value.clone().with_last_error(state.last_error.clone()))
    }

    fn lock_state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
