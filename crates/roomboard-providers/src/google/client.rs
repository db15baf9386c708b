//! Low-level HTTP client for the Directory and Calendar APIs.

use std::collections::HashMap;
use std::time::Duration;

use roomboard_core::{BusyInterval, Room, TimeWindow, format_rfc3339};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::auth::ServiceAccountAuth;
use super::config::{Endpoints, GoogleConfig, SCOPES};
use crate::error::{ProviderError, ProviderResult};
use crate::source::BusyMap;

/// Page size requested from `resources.calendars.list`.
const RESOURCES_PAGE_SIZE: u32 = 500;

/// Upper bound on pages followed, in case the API keeps returning tokens.
const MAX_RESOURCE_PAGES: usize = 100;

/// A calendar resource as returned by the Directory API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarResource {
    pub resource_id: String,
    #[serde(default)]
    pub resource_name: String,
    #[serde(default)]
    pub resource_email: Option<String>,
    #[serde(default)]
    pub building_id: Option<String>,
    #[serde(default)]
    pub floor_name: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

impl CalendarResource {
    /// Converts the resource into a [`Room`], dropping blank optional fields.
    pub fn into_room(self) -> Room {
        fn non_blank(value: Option<String>) -> Option<String> {
            value.filter(|v| !v.trim().is_empty())
        }

        Room {
            room_id: self.resource_id,
            room_name: self.resource_name,
            building_id: non_blank(self.building_id),
            floor_name: non_blank(self.floor_name),
            capacity: self.capacity,
            calendar_address: non_blank(self.resource_email),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceListResponse {
    #[serde(default)]
    items: Vec<CalendarResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, CalendarBusy>,
}

#[derive(Debug, Deserialize)]
struct CalendarBusy {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<CalendarError>,
}

#[derive(Debug, Deserialize)]
struct CalendarError {
    #[serde(default)]
    domain: String,
    #[serde(default)]
    reason: String,
}

/// Google Workspace API client.
#[derive(Debug)]
pub struct WorkspaceClient {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    endpoints: Endpoints,
}

impl WorkspaceClient {
    /// Creates a client for `config`.
    pub fn new(config: &GoogleConfig) -> ProviderResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {e}"))
            })?;
        let auth = ServiceAccountAuth::new(config.key.clone(), &config.impersonate_user, SCOPES)?;

        Ok(Self {
            http,
            auth,
            endpoints: config.endpoints.clone(),
        })
    }

    /// Lists every calendar resource of `customer`, following page tokens.
    pub async fn list_calendar_resources(
        &self,
        customer: &str,
    ) -> ProviderResult<Vec<CalendarResource>> {
        let url = self.endpoints.resources_url(customer);
        let mut resources = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..MAX_RESOURCE_PAGES {
            let token = self.auth.access_token(&self.http).await?;
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&[("maxResults", RESOURCES_PAGE_SIZE.to_string())]);
            if let Some(ref page) = page_token {
                request = request.query(&[("pageToken", page.as_str())]);
            }

            let body = self.send(request).await?;
            let page: ResourceListResponse = serde_json::from_str(&body).map_err(|e| {
                ProviderError::invalid_response(format!("failed to parse resources page: {e}"))
            })?;
            resources.extend(page.items);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => {
                    debug!(count = resources.len(), customer, "listed calendar resources");
                    return Ok(resources);
                }
            }
        }

        warn!(customer, pages = MAX_RESOURCE_PAGES, "resource listing truncated");
        Ok(resources)
    }

    /// Runs one `freeBusy.query` for `addresses` over `window`.
    pub async fn query_free_busy(
        &self,
        addresses: &[String],
        window: TimeWindow,
    ) -> ProviderResult<BusyMap> {
        let body = FreeBusyRequest {
            time_min: format_rfc3339(&window.start),
            time_max: format_rfc3339(&window.end),
            items: addresses.iter().map(|id| FreeBusyItem { id }).collect(),
        };

        let token = self.auth.access_token(&self.http).await?;
        let request = self
            .http
            .post(self.endpoints.free_busy_url())
            .bearer_auth(token)
            .json(&body);

        let text = self.send(request).await?;
        parse_free_busy(&text)
    }

    /// Sends a request and returns the body, classifying failures.
    async fn send(&self, request: reqwest::RequestBuilder) -> ProviderResult<String> {
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::network("request timeout")
            } else if e.is_connect() {
                ProviderError::network(format!("connection failed: {e}"))
            } else {
                ProviderError::network(format!("request failed: {e}"))
            }
        })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.auth.invalidate().await;
        }

        let mut err = ProviderError::from_http_status(status.as_u16(), &body);
        if let Some(delay) = retry_after {
            err = err.with_retry_after(delay);
        }
        Err(err)
    }
}

/// Parses a `freeBusy.query` response body.
///
/// Calendars reporting per-calendar errors (unknown calendar, missing
/// access) are logged and mapped to an empty busy list.
fn parse_free_busy(body: &str) -> ProviderResult<BusyMap> {
    let response: FreeBusyResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse freeBusy response: {e}"))
    })?;

    let mut result = BusyMap::with_capacity(response.calendars.len());
    for (address, calendar) in response.calendars {
        if !calendar.errors.is_empty() {
            let reasons: Vec<String> = calendar
                .errors
                .iter()
                .map(|e| format!("{}/{}", e.domain, e.reason))
                .collect();
            warn!(calendar = %address, reasons = ?reasons, "freeBusy reported calendar errors");
        }
        let mut busy = calendar.busy;
        busy.retain(|block| block.start < block.end);
        result.insert(address, busy);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn parses_busy_blocks_and_offsets() {
        let body = r#"{
            "kind": "calendar#freeBusy",
            "timeMin": "2025-02-05T09:59:00.000Z",
            "timeMax": "2025-02-05T13:10:00.000Z",
            "calendars": {
                "room-a@resource.calendar.google.com": {
                    "busy": [
                        {"start": "2025-02-05T10:00:00Z", "end": "2025-02-05T10:30:00Z"},
                        {"start": "2025-02-05T12:00:00+01:00", "end": "2025-02-05T12:15:00+01:00"}
                    ]
                },
                "room-b@resource.calendar.google.com": {"busy": []}
            }
        }"#;

        let map = parse_free_busy(body).unwrap();
        let a = &map["room-a@resource.calendar.google.com"];
        assert_eq!(a.len(), 2);
        assert_eq!(a[0].start, Utc.with_ymd_and_hms(2025, 2, 5, 10, 0, 0).unwrap());
        assert_eq!(a[1].start, Utc.with_ymd_and_hms(2025, 2, 5, 11, 0, 0).unwrap());
        assert!(map["room-b@resource.calendar.google.com"].is_empty());
    }

    #[test]
    fn calendar_errors_become_empty_lists() {
        let body = r#"{
            "calendars": {
                "gone@resource.calendar.google.com": {
                    "errors": [{"domain": "global", "reason": "notFound"}],
                    "busy": []
                }
            }
        }"#;

        let map = parse_free_busy(body).unwrap();
        assert!(map["gone@resource.calendar.google.com"].is_empty());
    }

    #[test]
    fn empty_blocks_are_dropped() {
        let body = r#"{"calendars": {"x": {"busy": [
            {"start": "2025-02-05T10:00:00Z", "end": "2025-02-05T10:00:00Z"}
        ]}}}"#;
        assert!(parse_free_busy(body).unwrap()["x"].is_empty());
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        let err = parse_free_busy("<html>oops</html>").unwrap_err();
        assert_eq!(
            err.code(),
            crate::error::ProviderErrorCode::InvalidResponse
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn request_body_wire_format() {
        let start = Utc.with_ymd_and_hms(2025, 2, 5, 9, 59, 0).unwrap();
        let window = TimeWindow::new(start, start + chrono::Duration::minutes(191));
        let addresses = ["a@x".to_string(), "b@x".to_string()];
        let body = FreeBusyRequest {
            time_min: format_rfc3339(&window.start),
            time_max: format_rfc3339(&window.end),
            items: addresses.iter().map(|id| FreeBusyItem { id }).collect(),
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "timeMin": "2025-02-05T09:59:00Z",
                "timeMax": "2025-02-05T13:10:00Z",
                "items": [{"id": "a@x"}, {"id": "b@x"}]
            })
        );
    }

    #[test]
    fn resources_convert_to_rooms() {
        let page: ResourceListResponse = serde_json::from_str(
            r#"{
                "items": [{
                    "resourceId": "1234",
                    "resourceName": "Aurora",
                    "resourceEmail": "c_1234@resource.calendar.google.com",
                    "resourceCategory": "CONFERENCE_ROOM",
                    "buildingId": "HQ",
                    "floorName": "",
                    "capacity": 8
                }],
                "nextPageToken": "abc"
            }"#,
        )
        .unwrap();
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));

        let room = page.items.into_iter().next().unwrap().into_room();
        assert_eq!(room.room_id, "1234");
        assert_eq!(room.building_id.as_deref(), Some("HQ"));
        assert_eq!(room.floor_name, None);
        assert_eq!(room.capacity, Some(8));
        assert_eq!(
            room.resolvable_calendar(),
            Some("c_1234@resource.calendar.google.com")
        );
    }
}
