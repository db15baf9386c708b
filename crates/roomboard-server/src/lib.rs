//! Meeting-room occupancy service.
//!
//! This crate provides the roomboard HTTP service:
//! - Read-through occupancy cache with stale fallback
//! - Batched, retrying free/busy fetching
//! - Optional background cache warmer
//! - JSON API and an embedded dashboard
//!
//! # Example
//!
//! ```rust,no_run
//! use roomboard_server::{ServiceConfig, SignalHandler, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::load_from("roomboard.toml".as_ref())?;
//!     config.validate()?;
//!
//!     let signals = SignalHandler::new();
//!     signals.spawn_listener();
//!     serve(config, signals.shutdown()).await?;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod page;
pub mod scheduler;
pub mod service;
pub mod signals;

#[cfg(test)]
mod testing;

pub use cache::{CacheEntry, CacheError, CacheSettings, OccupancyCache, Slot};
pub use config::ServiceConfig;
pub use error::{ApiError, ServerError, ServerResult};
pub use fetcher::{FreeBusyReport, RetryPolicy, RetryingFetcher, UpstreamError};
pub use http::{AppState, router};
pub use scheduler::{Scheduler, SchedulerCommand, SchedulerConfig, SchedulerHandle, SchedulerState};
pub use service::{Sources, build_cache, serve};
pub use signals::{ShutdownSignal, SignalHandler};
