//! Error types for directory and free/busy sources.
//!
//! Every failure carries a [`ProviderErrorCode`]; the code alone decides
//! whether a caller may retry ([`ErrorClass::Transient`]) or must give up
//! ([`ErrorClass::Permanent`]).

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Retry classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Rate limiting, server unavailability, network trouble.
    Transient,
    /// Authentication, configuration, malformed request or response.
    Permanent,
}

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are invalid or the token exchange was rejected.
    AuthenticationFailed,
    /// The impersonated account lacks access to the resource.
    AuthorizationFailed,
    /// Connection failure, timeout, DNS resolution.
    NetworkError,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx.
    ServerError,
    /// The upstream answered with something we could not parse.
    InvalidResponse,
    /// HTTP 404, e.g. unknown customer id.
    NotFound,
    /// HTTP 400 and other client errors.
    BadRequest,
    /// Missing or unreadable credentials, bad endpoint URLs.
    ConfigurationError,
    /// Unexpected internal state.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns the retry classification of this code.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NetworkError | Self::RateLimited | Self::ServerError => ErrorClass::Transient,
            _ => ErrorClass::Permanent,
        }
    }

    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Returns the snake_case name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }

    /// Maps an HTTP status code returned by an upstream API.
    ///
    /// Returns `None` for success and redirect codes.
    pub fn from_http_status(status: u16) -> Option<Self> {
        match status {
            100..=399 => None,
            401 => Some(Self::AuthenticationFailed),
            403 => Some(Self::AuthorizationFailed),
            404 => Some(Self::NotFound),
            408 => Some(Self::NetworkError),
            429 => Some(Self::RateLimited),
            400..=499 => Some(Self::BadRequest),
            _ => Some(Self::ServerError),
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by a [`DirectorySource`](crate::DirectorySource) or
/// [`FreeBusySource`](crate::FreeBusySource).
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// Source that raised the error ("google", "static").
    provider: Option<String>,
    /// Upstream hint from a `Retry-After` header.
    retry_after: Option<Duration>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            retry_after: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Builds an error from a non-success HTTP status and response body.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        let code = ProviderErrorCode::from_http_status(status)
            .unwrap_or(ProviderErrorCode::InvalidResponse);
        let body = body.trim();
        if body.is_empty() {
            Self::new(code, format!("HTTP {status}"))
        } else {
            Self::new(code, format!("HTTP {status}: {}", truncate(body, 300)))
        }
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Records the upstream `Retry-After` hint.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{provider}] ")?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
