//! Service configuration.
//!
//! Settings come from an optional TOML file, then CLI flags and environment
//! variables override individual fields (see [`crate::cli`]).
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:8080"
//! enable_cors = false
//! background_poll = true
//!
//! [signage]
//! refresh_seconds = 60
//! soon_minutes = 10
//! default_building_id = "HQ"
//!
//! [fetch]
//! batch_size = 40
//! max_retries = 3
//! base_delay_ms = 1000
//!
//! [google]
//! service_account_json = "/etc/roomboard/sa.json"
//! impersonate_user = "admin@example.com"
//!
//! [[rooms]]
//! id = "room04"
//! name = "0.4"
//! calendar = "c_04@resource.calendar.google.com"
//! ```

use std::path::Path;
use std::time::Duration;

use roomboard_core::Room;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::cache::CacheSettings;
use crate::error::{ServerError, ServerResult};
use crate::fetcher::RetryPolicy;

/// Status polls faster than this risk upstream throttling.
pub const MIN_RECOMMENDED_REFRESH_SECS: u64 = 30;

/// Lower bound of the room-list freshness window.
pub const MIN_ROOMS_TTL_SECS: u64 = 300;

/// Longest accepted status refresh interval (one day).
pub const MAX_REFRESH_SECS: u64 = 86_400;

/// Longest accepted "soon" horizon (one day).
pub const MAX_SOON_MINUTES: u64 = 1_440;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerSettings,
    pub signage: SignageSettings,
    pub fetch: FetchSettings,
    pub google: GoogleSettings,
    /// Fixed room list; when non-empty the Directory API is not queried.
    pub rooms: Vec<RoomSettings>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address, `host:port`.
    pub bind: String,
    /// Allow cross-origin GET requests.
    pub enable_cors: bool,
    /// Refresh the status cache in the background instead of on demand only.
    pub background_poll: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            enable_cors: false,
            background_poll: false,
        }
    }
}

/// Signage behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignageSettings {
    /// Poll interval, also the status freshness window.
    pub refresh_seconds: u64,
    /// Minutes before a booking when a free room is shown as "soon".
    pub soon_minutes: u64,
    /// Building preselected by the dashboard.
    pub default_building_id: String,
}

impl Default for SignageSettings {
    fn default() -> Self {
        Self {
            refresh_seconds: 60,
            soon_minutes: 10,
            default_building_id: String::new(),
        }
    }
}

/// Free/busy fetch policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    /// Calendars per free/busy request.
    pub batch_size: usize,
    /// Batches in flight at once.
    pub batch_concurrency: usize,
    /// Retries after the first attempt, transient failures only.
    pub max_retries: u32,
    /// Delay before the first retry; doubled on each further retry.
    pub base_delay_ms: u64,
    /// Upper bound of a single retry delay.
    pub max_delay_ms: u64,
    /// Random extra delay as a fraction of the computed delay (0.0-1.0).
    pub jitter: f64,
    /// HTTP timeout of a single upstream request.
    pub request_timeout_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: 40,
            batch_concurrency: 1,
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: 0.0,
            request_timeout_secs: 30,
        }
    }
}

/// Google Workspace credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// Inline service-account JSON or a path to the key file.
    pub service_account_json: Option<String>,
    /// Workspace user impersonated via domain-wide delegation.
    pub impersonate_user: Option<String>,
    /// Directory API customer id.
    pub customer: String,
    /// Overrides the Directory API base URL.
    pub directory_endpoint: Option<String>,
    /// Overrides the Calendar API base URL.
    pub calendar_endpoint: Option<String>,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            service_account_json: None,
            impersonate_user: None,
            customer: "my_customer".to_string(),
            directory_endpoint: None,
            calendar_endpoint: None,
        }
    }
}

impl GoogleSettings {
    /// Returns true if both the key and the impersonated user are set.
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.service_account_json) && set(&self.impersonate_user)
    }
}

/// A room entry of the static room list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSettings {
    pub id: String,
    pub name: String,
    pub calendar: String,
    #[serde(default)]
    pub building: Option<String>,
    #[serde(default)]
    pub floor: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl From<&RoomSettings> for Room {
    fn from(settings: &RoomSettings) -> Self {
        Room {
            room_id: settings.id.clone(),
            room_name: settings.name.clone(),
            building_id: settings.building.clone(),
            floor_name: settings.floor.clone(),
            capacity: settings.capacity,
            calendar_address: Some(settings.calendar.clone()),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from a TOML file.
    pub fn load_from(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServerError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    pub fn from_toml(content: &str) -> ServerResult<Self> {
        toml::from_str(content).map_err(|e| ServerError::config(format!("failed to parse config: {e}")))
    }

    /// Checks the settings for values the service cannot run with.
    pub fn validate(&self) -> ServerResult<()> {
        if self.signage.refresh_seconds == 0 {
            return Err(ServerError::config("refresh_seconds must be > 0"));
        }
        if self.signage.refresh_seconds < MIN_RECOMMENDED_REFRESH_SECS {
            warn!(
                refresh_seconds = self.signage.refresh_seconds,
                "refresh interval below {MIN_RECOMMENDED_REFRESH_SECS}s may hit upstream rate limits"
            );
        }
        if self.signage.refresh_seconds > MAX_REFRESH_SECS {
            return Err(ServerError::config(format!(
                "refresh_seconds must be <= {MAX_REFRESH_SECS}"
            )));
        }
        if self.signage.soon_minutes > MAX_SOON_MINUTES {
            return Err(ServerError::config(format!(
                "soon_minutes must be <= {MAX_SOON_MINUTES}"
            )));
        }
        if self.fetch.batch_size == 0 {
            return Err(ServerError::config("batch_size must be > 0"));
        }
        if self.fetch.batch_concurrency == 0 {
            return Err(ServerError::config("batch_concurrency must be > 0"));
        }
        if self.fetch.request_timeout_secs == 0 {
            return Err(ServerError::config("request_timeout_secs must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.fetch.jitter) {
            return Err(ServerError::config("jitter must be between 0.0 and 1.0"));
        }
        if self.server.bind.trim().is_empty() {
            return Err(ServerError::config("bind address is empty"));
        }
        if let Some(room) = self.rooms.iter().find(|r| r.calendar.trim().is_empty()) {
            return Err(ServerError::config(format!(
                "room '{}' has no calendar address",
                room.id
            )));
        }
        if self.rooms.is_empty() && !self.google.is_configured() {
            return Err(ServerError::config(
                "no [[rooms]] configured and Google credentials missing \
                 (GOOGLE_SERVICE_ACCOUNT_JSON, GOOGLE_IMPERSONATE_USER)",
            ));
        }
        Ok(())
    }

    /// Freshness window of the status slot.
    pub fn status_ttl(&self) -> Duration {
        Duration::from_secs(self.signage.refresh_seconds)
    }

    /// Freshness window of the room-list slot.
    pub fn rooms_ttl(&self) -> Duration {
        Duration::from_secs(
            self.signage
                .refresh_seconds
                .saturating_mul(10)
                .max(MIN_ROOMS_TTL_SECS),
        )
    }

    /// The "soon" horizon.
    pub fn soon(&self) -> Duration {
        Duration::from_secs(self.signage.soon_minutes.saturating_mul(60))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.request_timeout_secs)
    }

    /// Retry policy of the free/busy fetcher.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.fetch.max_retries,
            Duration::from_millis(self.fetch.base_delay_ms),
        )
        .with_max_delay(Duration::from_millis(self.fetch.max_delay_ms))
        .with_jitter(self.fetch.jitter)
    }

    /// Cache freshness windows and payload settings.
    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings::new(self.status_ttl(), self.soon())
            .with_rooms_ttl(self.rooms_ttl())
            .with_default_building(self.signage.default_building_id.clone())
    }

    /// A copy safe to print: an inline service-account key is replaced.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let Some(key) = config.google.service_account_json.as_mut()
            && key.trim_start().starts_with('{')
        {
            *key = "<redacted inline key>".to_string();
        }
        config
    }

    /// The static room list as domain records.
    pub fn static_rooms(&self) -> Vec<Room> {
        self.rooms.iter().map(Room::from).collect()
    }
}
