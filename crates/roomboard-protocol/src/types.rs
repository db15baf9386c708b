//! Response bodies of the roomboard HTTP API.

use chrono::{DateTime, Utc};
use roomboard_core::time::rfc3339;
use roomboard_core::{Room, RoomStatus};
use serde::{Deserialize, Serialize};

/// Body of `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusPayload {
    /// When the statuses were computed.
    #[serde(with = "rfc3339")]
    pub generated_at: DateTime<Utc>,
    /// Poll interval the dashboard should use.
    pub refresh_seconds: u64,
    /// "Soon" horizon used for the statuses.
    pub soon_minutes: u64,
    /// Building preselected by the dashboard, empty for none.
    pub default_building_id: String,
    /// Per-room statuses, in display order.
    pub items: Vec<RoomStatus>,
    /// Most recent fetch failure, if any.
    pub last_error: Option<String>,
}

impl StatusPayload {
    /// Returns a copy annotated with the given error.
    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = last_error;
        self
    }
}

/// Body of `GET /api/rooms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomsPayload {
    pub count: usize,
    pub items: Vec<Room>,
    pub last_error: Option<String>,
}

impl RoomsPayload {
    /// Builds the payload, deriving `count` from `items`.
    pub fn new(items: Vec<Room>, last_error: Option<String>) -> Self {
        Self {
            count: items.len(),
            items,
            last_error,
        }
    }
}

/// Body of `GET /healthz`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthPayload {
    pub ok: bool,
    #[serde(with = "rfc3339")]
    pub time: DateTime<Utc>,
}

impl HealthPayload {
    /// A healthy response stamped with `time`.
    pub fn ok_at(time: DateTime<Utc>) -> Self {
        Self { ok: true, time }
    }
}

/// Body returned with HTTP 500 when no data can be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Short, safe description of what failed.
    pub error: String,
    /// Upstream failure message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorBody {
    /// Creates an error body.
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
        }
    }

    /// Builder: attach a detail message.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use roomboard_core::BusyInterval;

    fn utc(h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 5, h, min, 0).unwrap()
    }

    fn sample_status() -> StatusPayload {
        StatusPayload {
            generated_at: utc(10, 0),
            refresh_seconds: 60,
            soon_minutes: 10,
            default_building_id: "HQ".to_string(),
            items: vec![RoomStatus {
                room_id: "r-1".to_string(),
                room_name: "Aurora".to_string(),
                building_id: Some("HQ".to_string()),
                floor_name: Some("2".to_string()),
                capacity: Some(8),
                is_busy_now: true,
                is_soon: false,
                next_change_time: Some(utc(10, 5)),
                upcoming_blocks: vec![BusyInterval::new(utc(9, 50), utc(10, 5))],
            }],
            last_error: None,
        }
    }

    #[test]
    fn status_payload_wire_format() {
        insta::assert_json_snapshot!(sample_status(), @r###"
        {
          "generatedAt": "2025-02-05T10:00:00Z",
          "refreshSeconds": 60,
          "soonMinutes": 10,
          "defaultBuildingId": "HQ",
          "items": [
            {
              "roomId": "r-1",
              "roomName": "Aurora",
              "buildingId": "HQ",
              "floorName": "2",
              "capacity": 8,
              "isBusyNow": true,
              "isSoon": false,
              "nextChangeTime": "2025-02-05T10:05:00Z",
              "upcomingBlocks": [
                {
                  "start": "2025-02-05T09:50:00Z",
                  "end": "2025-02-05T10:05:00Z"
                }
              ]
            }
          ],
          "lastError": null
        }
        "###);
    }

    #[test]
    fn degraded_status_keeps_items() {
        let payload = sample_status().with_last_error(Some("STATUS_ERROR: boom".to_string()));
        assert!(payload.last_error.is_some());
        assert_eq!(payload.items.len(), 1);

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["lastError"], "STATUS_ERROR: boom");
    }

    #[test]
    fn rooms_payload_counts_items() {
        let payload = RoomsPayload::new(
            vec![Room::new("a", "A"), Room::new("b", "B")],
            Some("ROOMS_ERROR: timeout".to_string()),
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["count"], 2);
        assert_eq!(json["items"][1]["roomName"], "B");
        assert_eq!(json["lastError"], "ROOMS_ERROR: timeout");
    }

    #[test]
    fn health_payload_uses_z_suffix() {
        let json = serde_json::to_string(&HealthPayload::ok_at(utc(8, 30))).unwrap();
        assert_eq!(json, r#"{"ok":true,"time":"2025-02-05T08:30:00Z"}"#);
    }

    #[test]
    fn error_body_omits_missing_detail() {
        let json = serde_json::to_string(&ErrorBody::new("status unavailable")).unwrap();
        assert_eq!(json, r#"{"error":"status unavailable"}"#);

        let body = ErrorBody::new("status unavailable").with_detail("upstream 503");
        assert_eq!(body.detail.as_deref(), Some("upstream 503"));
    }
}
