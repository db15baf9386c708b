//! JSON wire payloads for the roomboard HTTP API.
//!
//! Every timestamp is RFC3339 UTC with a `Z` suffix; field names are
//! camelCase so the dashboard can consume them directly.
//!
//! | endpoint          | body              |
//! |-------------------|-------------------|
//! | `GET /api/status` | [`StatusPayload`] |
//! | `GET /api/rooms`  | [`RoomsPayload`]  |
//! | `GET /healthz`    | [`HealthPayload`] |
//! | any, on HTTP 500  | [`ErrorBody`]     |

mod types;

pub use types::{ErrorBody, HealthPayload, RoomsPayload, StatusPayload};
