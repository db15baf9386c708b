//! Room and occupancy records.
//!
//! - [`Room`]: a bookable meeting room as listed by the directory
//! - [`BusyInterval`]: an opaque busy block on a room calendar
//! - [`RoomStatus`]: the derived occupancy of one room at a point in time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::time::rfc3339;

/// A meeting room resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Stable identifier of the room resource.
    pub room_id: String,
    /// Human-readable room name.
    pub room_name: String,
    /// Building the room belongs to.
    #[serde(default)]
    pub building_id: Option<String>,
    /// Floor name within the building.
    #[serde(default)]
    pub floor_name: Option<String>,
    /// Seating capacity.
    #[serde(default)]
    pub capacity: Option<u32>,
    /// Calendar address used to query free/busy data.
    #[serde(default)]
    pub calendar_address: Option<String>,
}

impl Room {
    /// Creates a room with only identity fields set.
    pub fn new(room_id: impl Into<String>, room_name: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            room_name: room_name.into(),
            building_id: None,
            floor_name: None,
            capacity: None,
            calendar_address: None,
        }
    }

    /// Builder: set the building.
    pub fn with_building(mut self, building_id: impl Into<String>) -> Self {
        self.building_id = Some(building_id.into());
        self
    }

    /// Builder: set the floor.
    pub fn with_floor(mut self, floor_name: impl Into<String>) -> Self {
        self.floor_name = Some(floor_name.into());
        self
    }

    /// Builder: set the capacity.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Builder: set the calendar address.
    pub fn with_calendar(mut self, address: impl Into<String>) -> Self {
        self.calendar_address = Some(address.into());
        self
    }

    /// Returns the calendar address, ignoring blank values.
    pub fn resolvable_calendar(&self) -> Option<&str> {
        self.calendar_address
            .as_deref()
            .map(str::trim)
            .filter(|address| !address.is_empty())
    }
}

/// A busy block `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusyInterval {
    /// Start of the block (inclusive).
    #[serde(with = "rfc3339")]
    pub start: DateTime<Utc>,
    /// End of the block (exclusive).
    #[serde(with = "rfc3339")]
    pub end: DateTime<Utc>,
}

impl BusyInterval {
    /// Creates a new busy interval.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Returns true if `at` falls within `[start, end)`.
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// The derived occupancy state of one room.
///
/// `is_busy_now` and `is_soon` are never both true, and `upcoming_blocks`
/// holds at most [`crate::status::MAX_UPCOMING_BLOCKS`] entries ordered by
/// start time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatus {
    pub room_id: String,
    pub room_name: String,
    pub building_id: Option<String>,
    pub floor_name: Option<String>,
    pub capacity: Option<u32>,
    /// Whether a busy block covers the current instant.
    pub is_busy_now: bool,
    /// Whether the room is free but booked within the "soon" horizon.
    pub is_soon: bool,
    /// When the room next flips between busy and free.
    #[serde(with = "rfc3339::option")]
    pub next_change_time: Option<DateTime<Utc>>,
    /// Current and upcoming busy blocks, most imminent first.
    pub upcoming_blocks: Vec<BusyInterval>,
}
