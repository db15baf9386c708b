//! The embedded dashboard.
//!
//! A single self-contained page: it polls `/api/status` every
//! `refreshSeconds`, filters by building (preselecting
//! `defaultBuildingId`) and floor, and shows a banner while `lastError` is
//! set.

pub const DASHBOARD_HTML: &str = include_str!("../assets/dashboard.html");
