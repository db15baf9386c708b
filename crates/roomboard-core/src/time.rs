//! Time windows and wire timestamp helpers.
//!
//! This module provides [`TimeWindow`] for free/busy query ranges,
//! [`query_window`] which computes the range polled on every refresh, and the
//! [`rfc3339`] serde helpers used for every timestamp on the wire.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Backward pad, in minutes, applied to the query window to absorb clock skew.
pub const QUERY_BACKWARD_PAD_MINUTES: i64 = 1;

/// Lookahead beyond the "soon" horizon, so upcoming blocks can be populated.
pub const QUERY_LOOKAHEAD_MINUTES: i64 = 180;

/// Lower bound for the "soon" horizon when sizing the query window.
pub const MIN_SOON_HORIZON_MINUTES: i64 = 10;

/// A time window for free/busy queries.
///
/// Represents a half-open interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start of the window (inclusive).
    #[serde(with = "rfc3339")]
    pub start: DateTime<Utc>,
    /// End of the window (exclusive).
    #[serde(with = "rfc3339")]
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Panics
    ///
    /// Panics if `start` is after `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        assert!(start <= end, "TimeWindow start must be <= end");
        Self { start, end }
    }
}

/// Returns the free/busy query window for a refresh happening at `now`.
///
/// The window is `[now - 1 minute, now + max(soon, 10 minutes) + 180 minutes)`.
/// The backward pad keeps a meeting that ends exactly at `now` visible at the
/// boundary; the forward pad covers "soon" detection plus upcoming blocks.
///
/// The end saturates at the latest representable instant.
pub fn query_window(now: DateTime<Utc>, soon: Duration) -> TimeWindow {
    let horizon = soon.max(Duration::minutes(MIN_SOON_HORIZON_MINUTES));
    TimeWindow::new(
        now - Duration::minutes(QUERY_BACKWARD_PAD_MINUTES),
        saturating_add(
            saturating_add(now, horizon),
            Duration::minutes(QUERY_LOOKAHEAD_MINUTES),
        ),
    )
}

/// `dt + delta`, clamped to the representable range.
pub fn saturating_add(dt: DateTime<Utc>, delta: Duration) -> DateTime<Utc> {
    dt.checked_add_signed(delta).unwrap_or(if delta < Duration::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Formats a timestamp as RFC3339 UTC with a `Z` suffix and second precision.
pub fn format_rfc3339(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Serde helpers for `DateTime<Utc>` fields rendered as `2025-02-05T10:30:00Z`.
pub mod rfc3339 {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_rfc3339(dt))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }

    /// Same as the parent module, for optional fields.
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match dt {
                Some(dt) => serializer.serialize_some(&super::super::format_rfc3339(dt)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
        }
    }
}
