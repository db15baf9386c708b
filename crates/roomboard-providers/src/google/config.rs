//! Google Workspace provider configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::{ProviderError, ProviderResult};

/// Scopes requested for the delegated service-account token.
pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/admin.directory.resource.calendar.readonly",
    "https://www.googleapis.com/auth/calendar.freebusy",
];

/// Customer alias that resolves to the account's own Workspace customer.
pub const DEFAULT_CUSTOMER: &str = "my_customer";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const DIRECTORY_API_BASE: &str = "https://admin.googleapis.com/admin/directory/v1";
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// The fields of a service-account JSON key that the token exchange needs.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Loads a key from either inline JSON or a path to a JSON file.
    ///
    /// Values starting with `{` are parsed as JSON; anything else is read
    /// from the filesystem.
    pub fn load(raw: &str) -> ProviderResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProviderError::configuration(
                "service account key is empty",
            ));
        }
        if raw.starts_with('{') {
            Self::from_json(raw)
        } else {
            Self::from_file(raw)
        }
    }

    /// Reads a key file.
    pub fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read service account key {}: {e}",
                path.display()
            ))
            .with_source(e)
        })?;
        Self::from_json(&content)
    }

    /// Parses a key from its JSON text.
    pub fn from_json(json: &str) -> ProviderResult<Self> {
        let key: Self = serde_json::from_str(json).map_err(|e| {
            ProviderError::configuration(format!("invalid service account key: {e}"))
        })?;
        if key.client_email.trim().is_empty() {
            return Err(ProviderError::configuration(
                "service account key has no client_email",
            ));
        }
        if !key.private_key.contains("PRIVATE KEY") {
            return Err(ProviderError::configuration(
                "service account key has no PEM private_key",
            ));
        }
        Ok(key)
    }
}

/// API endpoints, overridable for tests and proxies.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub directory: Url,
    pub calendar: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            directory: Url::parse(DIRECTORY_API_BASE).expect("valid directory base URL"),
            calendar: Url::parse(CALENDAR_API_BASE).expect("valid calendar base URL"),
        }
    }
}

impl Endpoints {
    /// Builds endpoints from base URL strings.
    pub fn new(directory: &str, calendar: &str) -> ProviderResult<Self> {
        let parse = |raw: &str| {
            Url::parse(raw.trim_end_matches('/')).map_err(|e| {
                ProviderError::configuration(format!("invalid endpoint URL '{raw}': {e}"))
            })
        };
        Ok(Self {
            directory: parse(directory)?,
            calendar: parse(calendar)?,
        })
    }

    pub(crate) fn resources_url(&self, customer: &str) -> String {
        format!(
            "{}/customer/{}/resources/calendars",
            self.directory.as_str().trim_end_matches('/'),
            urlencoding::encode(customer)
        )
    }

    pub(crate) fn free_busy_url(&self) -> String {
        format!("{}/freeBusy", self.calendar.as_str().trim_end_matches('/'))
    }
}

/// Configuration for the Google Workspace provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub key: ServiceAccountKey,
    /// Workspace user impersonated through domain-wide delegation.
    pub impersonate_user: String,
    /// Directory API customer id.
    pub customer: String,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    pub endpoints: Endpoints,
}

impl GoogleConfig {
    pub fn new(key: ServiceAccountKey, impersonate_user: impl Into<String>) -> Self {
        Self {
            key,
            impersonate_user: impersonate_user.into(),
            customer: DEFAULT_CUSTOMER.to_string(),
            request_timeout: Duration::from_secs(30),
            endpoints: Endpoints::default(),
        }
    }

    /// Builder method to set the Directory customer id.
    pub fn with_customer(mut self, customer: impl Into<String>) -> Self {
        let customer = customer.into();
        if !customer.trim().is_empty() {
            self.customer = customer;
        }
        self
    }

    /// Builder method to set the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to point at different API endpoints.
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn validate(&self) -> ProviderResult<()> {
        if !self.impersonate_user.contains('@') {
            return Err(ProviderError::configuration(format!(
                "impersonated user '{}' is not an email address",
                self.impersonate_user
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ProviderError::configuration("request timeout must be > 0"));
        }
        Ok(())
    }
}
