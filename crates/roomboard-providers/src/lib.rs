//! Directory and free/busy sources for roomboard.
//!
//! - [`DirectorySource`] / [`FreeBusySource`]: the contracts the occupancy
//!   engine consumes
//! - [`ProviderError`]: classified failures, see [`ProviderError::is_retryable`]
//! - [`StaticDirectory`]: rooms listed in configuration
//! - [`google::GoogleWorkspace`]: Directory API + Calendar freeBusy
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────────────┐
//! │ StaticDirectory  │   │ Google Workspace APIs    │
//! └────────┬─────────┘   └────────────┬─────────────┘
//!          │                          │
//!          │ DirectorySource          │ DirectorySource + FreeBusySource
//!          └────────────┬─────────────┘
//!                       ▼
//!              roomboard-server fetcher/cache
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod source;
pub mod static_rooms;

pub use error::{ErrorClass, ProviderError, ProviderErrorCode, ProviderResult};
pub use source::{BoxFuture, BusyMap, DirectorySource, FreeBusySource, UnavailableSource};
pub use static_rooms::StaticDirectory;
