//! Wiring: providers, cache, warmer and the HTTP listener.

use std::sync::Arc;

use roomboard_providers::{DirectorySource, FreeBusySource, StaticDirectory, UnavailableSource};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::cache::OccupancyCache;
use crate::config::ServiceConfig;
use crate::error::ServerResult;
use crate::fetcher::RetryingFetcher;
use crate::http::{AppState, router};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::signals::ShutdownSignal;

/// The upstream sources the cache reads from.
pub struct Sources {
    pub directory: Arc<dyn DirectorySource>,
    pub free_busy: Arc<dyn FreeBusySource>,
}

impl Sources {
    /// Picks the sources for `config`.
    ///
    /// A configured `[[rooms]]` list replaces the Directory API. Free/busy
    /// always comes from Google. A provider that cannot be built is replaced
    /// by an [`UnavailableSource`] so the service still starts and reports
    /// the failure through `lastError`.
    pub fn from_config(config: &ServiceConfig) -> ServerResult<Self> {
        let google = google_sources(config);

        let directory: Arc<dyn DirectorySource> = if config.rooms.is_empty() {
            match &google {
                Ok(workspace) => workspace.directory.clone(),
                Err(reason) => Arc::new(UnavailableSource::new("google", reason.clone())),
            }
        } else {
            let rooms = StaticDirectory::new(config.static_rooms())?;
            info!(rooms = rooms.len(), "using static room list");
            Arc::new(rooms)
        };

        let free_busy: Arc<dyn FreeBusySource> = match google {
            Ok(workspace) => workspace.free_busy,
            Err(reason) => {
                warn!(reason = %reason, "free/busy source unavailable");
                Arc::new(UnavailableSource::new("google", reason))
            }
        };

        Ok(Self {
            directory,
            free_busy,
        })
    }
}

#[cfg(feature = "google")]
fn google_sources(config: &ServiceConfig) -> Result<Sources, String> {
    use roomboard_providers::ProviderResult;
    use roomboard_providers::google::{
        CALENDAR_API_BASE, DIRECTORY_API_BASE, Endpoints, GoogleConfig, GoogleWorkspace,
        ServiceAccountKey,
    };

    let settings = &config.google;
    if !settings.is_configured() {
        return Err(
            "Google credentials missing (GOOGLE_SERVICE_ACCOUNT_JSON, GOOGLE_IMPERSONATE_USER)"
                .to_string(),
        );
    }
    let raw_key = settings.service_account_json.as_deref().unwrap_or_default();
    let user = settings.impersonate_user.as_deref().unwrap_or_default();

    let build = || -> ProviderResult<GoogleWorkspace> {
        let key = ServiceAccountKey::load(raw_key)?;
        let mut google = GoogleConfig::new(key, user)
            .with_customer(settings.customer.clone())
            .with_timeout(config.request_timeout());
        if settings.directory_endpoint.is_some() || settings.calendar_endpoint.is_some() {
            google = google.with_endpoints(Endpoints::new(
                settings
                    .directory_endpoint
                    .as_deref()
                    .unwrap_or(DIRECTORY_API_BASE),
                settings
                    .calendar_endpoint
                    .as_deref()
                    .unwrap_or(CALENDAR_API_BASE),
            )?);
        }
        google.validate()?;
        GoogleWorkspace::new(google)
    };

    match build() {
        Ok(workspace) => {
            info!(user, customer = %settings.customer, "Google Workspace provider ready");
            let workspace = Arc::new(workspace);
            Ok(Sources {
                directory: workspace.clone(),
                free_busy: workspace,
            })
        }
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(not(feature = "google"))]
fn google_sources(_config: &ServiceConfig) -> Result<Sources, String> {
    Err("built without the google feature".to_string())
}

/// Builds the occupancy cache for `config` over `sources`.
pub fn build_cache(config: &ServiceConfig, sources: Sources) -> OccupancyCache {
    let fetcher = RetryingFetcher::new(sources.free_busy, config.retry_policy())
        .with_batch_size(config.fetch.batch_size)
        .with_concurrency(config.fetch.batch_concurrency);
    OccupancyCache::new(sources.directory, fetcher, config.cache_settings())
}

/// Runs the HTTP service until `shutdown` fires.
pub async fn serve(config: ServiceConfig, shutdown: ShutdownSignal) -> ServerResult<()> {
    let sources = Sources::from_config(&config)?;
    let cache = Arc::new(build_cache(&config, sources));

    let warmer = config.server.background_poll.then(|| {
        let scheduler = Scheduler::new(SchedulerConfig::new(config.status_ttl()));
        let handle = scheduler.handle();
        let cache = cache.clone();
        let task = tokio::spawn(scheduler.run(move || {
            let cache = cache.clone();
            async move { cache.warm().await }
        }));
        (handle, task)
    });

    let listener = TcpListener::bind(config.server.bind.as_str()).await?;
    info!(
        addr = %listener.local_addr()?,
        refresh_seconds = config.signage.refresh_seconds,
        background_poll = config.server.background_poll,
        cors = config.server.enable_cors,
        "roomboard listening"
    );

    let app = router(AppState::new(cache), config.server.enable_cors);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    if let Some((handle, task)) = warmer {
        let _ = handle.stop().await;
        let _ = task.await;
    }
    info!("roomboard stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::SignalHandler;

    fn static_config() -> ServiceConfig {
        ServiceConfig::from_toml(
            r#"
            [[rooms]]
            id = "room04"
            name = "0.4"
            calendar = "c_04@resource.calendar.google.com"
            "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn static_rooms_without_credentials() {
        let sources = Sources::from_config(&static_config()).unwrap();
        assert_eq!(sources.directory.name(), "static");
        assert_eq!(sources.free_busy.name(), "google");

        let rooms = sources.directory.list_rooms().await.unwrap();
        assert_eq!(rooms[0].room_id, "room04");

        let now = chrono::Utc::now();
        let window = roomboard_core::query_window(now, chrono::Duration::minutes(10));
        let err = sources
            .free_busy
            .query_free_busy(&["c_04@resource.calendar.google.com".to_string()], window)
            .await
            .unwrap_err();
        assert!(
            err.message().contains("GOOGLE_SERVICE_ACCOUNT_JSON")
                || err.message().contains("google feature")
        );
    }

    #[tokio::test]
    async fn unavailable_provider_surfaces_as_last_error() {
        let config = static_config();
        let cache = build_cache(&config, Sources::from_config(&config).unwrap());

        assert!(cache.status().await.is_err());
        assert!(cache.last_error().unwrap().starts_with("STATUS_ERROR"));
    }

    #[cfg(feature = "google")]
    #[test]
    fn broken_key_falls_back_to_unavailable() {
        let mut config = ServiceConfig::default();
        config.google.service_account_json = Some("{not json".to_string());
        config.google.impersonate_user = Some("admin@example.com".to_string());

        let sources = Sources::from_config(&config).unwrap();
        assert_eq!(sources.directory.name(), "google");
        assert_eq!(sources.free_busy.name(), "google");
    }

    #[tokio::test]
    async fn serve_stops_on_shutdown() {
        let mut config = static_config();
        config.server.bind = "127.0.0.1:0".to_string();
        config.server.background_poll = true;

        let signals = SignalHandler::new();
        let server = tokio::spawn(serve(config, signals.shutdown()));
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        signals.trigger_shutdown();

        let result = tokio::time::timeout(std::time::Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[test]
    fn duplicate_static_ids_are_tolerated() {
        let mut config = static_config();
        config.rooms.push(config.rooms[0].clone());
        assert!(Sources::from_config(&config).is_ok());
    }
}
