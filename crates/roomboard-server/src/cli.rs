//! Command-line interface definition.
//!
//! Every setting can also come from the environment; flags and environment
//! variables take precedence over the config file.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::ServiceConfig;

/// roomboard - meeting-room occupancy for wall displays
#[derive(Debug, Parser)]
#[command(name = "roomboard")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "ROOMBOARD_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log as JSON lines
    #[arg(long, env = "ROOMBOARD_LOG_JSON")]
    pub log_json: bool,

    // --- Listener ---
    /// Listen address (host:port)
    #[arg(long, env = "BIND")]
    pub bind: Option<String>,

    /// Listen port, replacing the port of the bind address
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Allow cross-origin GET requests
    #[arg(long, env = "ENABLE_CORS")]
    pub enable_cors: bool,

    /// Keep the status cache warm with a background refresh
    #[arg(long, env = "ROOMBOARD_BACKGROUND_POLL")]
    pub background_poll: bool,

    // --- Signage ---
    /// Status refresh interval in seconds
    #[arg(long, env = "REFRESH_SECONDS")]
    pub refresh_seconds: Option<u64>,

    /// Minutes before a booking when a free room is shown as "soon"
    #[arg(long, env = "SOON_MINUTES")]
    pub soon_minutes: Option<u64>,

    /// Building preselected on the dashboard
    #[arg(long, env = "DEFAULT_BUILDING_ID")]
    pub default_building_id: Option<String>,

    // --- Google Workspace ---
    /// Service-account key: inline JSON or a path to the key file
    #[arg(long, env = "GOOGLE_SERVICE_ACCOUNT_JSON", hide_env_values = true)]
    pub google_service_account_json: Option<String>,

    /// Workspace user to impersonate
    #[arg(long, env = "GOOGLE_IMPERSONATE_USER")]
    pub google_impersonate_user: Option<String>,

    /// Directory API customer id
    #[arg(long, env = "GOOGLE_CUSTOMER")]
    pub google_customer: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Subcommands. Without one, the service runs.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Fetch the status once and print it as JSON
    Status,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,
    /// Validate the effective configuration
    Validate,
}

impl Cli {
    /// Overrides `config` with the values given on the command line or in
    /// the environment.
    pub fn apply(&self, config: &mut ServiceConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.bind = with_port(&config.server.bind, port);
        }
        if self.enable_cors {
            config.server.enable_cors = true;
        }
        if self.background_poll {
            config.server.background_poll = true;
        }

        if let Some(refresh) = self.refresh_seconds {
            config.signage.refresh_seconds = refresh;
        }
        if let Some(soon) = self.soon_minutes {
            config.signage.soon_minutes = soon;
        }
        if let Some(building) = &self.default_building_id {
            config.signage.default_building_id = building.clone();
        }

        if let Some(key) = &self.google_service_account_json {
            config.google.service_account_json = Some(key.clone());
        }
        if let Some(user) = &self.google_impersonate_user {
            config.google.impersonate_user = Some(user.clone());
        }
        if let Some(customer) = self.google_customer.as_deref().filter(|c| !c.trim().is_empty()) {
            config.google.customer = customer.to_string();
        }
    }
}

/// Replaces the port of a `host:port` address.
fn with_port(bind: &str, port: u16) -> String {
    let host = match bind.rsplit_once(':') {
        Some((host, _)) if !host.is_empty() => host,
        _ => bind,
    };
    format!("{host}:{port}")
}
