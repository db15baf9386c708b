//! Server error types.

use std::io;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use roomboard_protocol::ErrorBody;
use roomboard_providers::ProviderError;
use thiserror::Error;
use tracing::error;

use crate::cache::{CacheError, Slot};

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that stop the service from starting or running.
#[derive(Debug, Error)]
pub enum ServerError {
    /// IO error (bind, config file).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A provider could not be constructed.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Logging could not be initialised.
    #[error("Tracing error: {0}")]
    Tracing(#[from] roomboard_core::TracingError),

    /// Upstream data could not be fetched.
    #[error("Upstream unavailable: {0}")]
    Unavailable(#[from] CacheError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServerError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

/// Errors returned by HTTP handlers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No data could be fetched and nothing was cached.
    #[error(transparent)]
    Unavailable(#[from] CacheError),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn body(&self) -> ErrorBody {
        match self {
            Self::Unavailable(CacheError::NoFallback { slot, message }) => {
                let summary = match slot {
                    Slot::Rooms => "Backend failed to fetch room list",
                    Slot::Status => "Backend failed to fetch room status",
                };
                ErrorBody::new(summary).with_detail(message.clone())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        error!(status = %status, error = %self, "request failed");
        (status, Json(self.body())).into_response()
    }
}
