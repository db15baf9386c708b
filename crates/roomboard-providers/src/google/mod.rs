//! Google Workspace provider.
//!
//! Authenticates with a service-account key and domain-wide delegation,
//! lists room resources through the Admin SDK Directory API and reads busy
//! blocks through Calendar `freeBusy.query`. Only opaque busy intervals are
//! requested, never event details.
//!
//! ```ignore
//! use roomboard_providers::google::{GoogleConfig, GoogleWorkspace, ServiceAccountKey};
//!
//! let key = ServiceAccountKey::load(&std::env::var("GOOGLE_SERVICE_ACCOUNT_JSON")?)?;
//! let workspace = GoogleWorkspace::new(GoogleConfig::new(key, "admin@example.com"))?;
//! let rooms = workspace.list_rooms().await?;
//! ```

mod auth;
mod client;
mod config;
mod provider;

pub use auth::{AccessToken, AssertionClaims, ServiceAccountAuth};
pub use client::{CalendarResource, WorkspaceClient};
pub use config::{
    CALENDAR_API_BASE, DEFAULT_CUSTOMER, DIRECTORY_API_BASE, Endpoints, GoogleConfig, SCOPES,
    ServiceAccountKey,
};
pub use provider::GoogleWorkspace;
