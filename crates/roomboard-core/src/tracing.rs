//! Log setup for the roomboard service.
//!
//! Logs go to stderr, either as compact text lines or as JSON objects for log
//! shippers. `RUST_LOG` replaces the default filter when set.

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crate targets enabled at the default level when `RUST_LOG` is unset.
const DEFAULT_TARGETS: &[&str] = &[
    "roomboard",
    "roomboard_core",
    "roomboard_providers",
    "roomboard_server",
    "tower_http",
];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install tracing subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One compact text line per event.
    #[default]
    Text,
    /// One JSON object per event, fields flattened.
    Json,
}

/// Log configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TracingConfig {
    pub level: Level,
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::new(LogFormat::Text)
    }
}

impl TracingConfig {
    pub fn new(format: LogFormat) -> Self {
        Self {
            level: Level::INFO,
            format,
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Filter directive used when `RUST_LOG` is unset: every roomboard crate
    /// plus the HTTP trace layer at `level`.
    pub fn default_directive(&self) -> String {
        let level = self.level.to_string().to_lowercase();
        DEFAULT_TARGETS
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn filter(&self) -> Result<EnvFilter, TracingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }
}

/// Installs the global subscriber. Call once at startup.
///
/// # Errors
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let registry = tracing_subscriber::registry().with(config.filter()?);
    match config.format {
        LogFormat::Text => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .try_init()?,
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
    }
    Ok(())
}
