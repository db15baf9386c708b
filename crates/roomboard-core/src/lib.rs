//! Core types: rooms, busy intervals, occupancy derivation, time windows

pub mod room;
pub mod status;
pub mod time;
pub mod tracing;

pub use room::{BusyInterval, Room, RoomStatus};
pub use status::{MAX_UPCOMING_BLOCKS, compare_statuses, derive_all, derive_status};
pub use time::{TimeWindow, format_rfc3339, query_window};
pub use tracing::{LogFormat, TracingConfig, TracingError, init_tracing};
