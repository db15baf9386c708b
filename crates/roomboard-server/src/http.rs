//! HTTP surface.
//!
//! Endpoints:
//! - GET /              - Dashboard page
//! - GET /api/status    - Room occupancy
//! - GET /api/rooms     - Room list
//! - GET /healthz       - Liveness (also served at /api/health)

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderValue, Method, header};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use roomboard_protocol::{HealthPayload, RoomsPayload, StatusPayload};
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::cache::OccupancyCache;
use crate::error::ApiError;
use crate::page;

/// State shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<OccupancyCache>,
}

impl AppState {
    pub fn new(cache: Arc<OccupancyCache>) -> Self {
        Self { cache }
    }
}

/// Builds the service router.
pub fn router(state: AppState, enable_cors: bool) -> Router {
    let api = Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/rooms", get(rooms_handler))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    let router = Router::new()
        .route("/", get(index_handler))
        .route("/healthz", get(health_handler))
        .route("/api/health", get(health_handler))
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if enable_cors {
        let cors = CorsLayer::new()
            .allow_methods([Method::GET])
            .allow_headers(Any)
            .allow_origin(Any);
        router.layer(cors)
    } else {
        router
    }
}

async fn status_handler(State(state): State<AppState>) -> Result<Json<StatusPayload>, ApiError> {
    Ok(Json(state.cache.status().await?))
}

async fn rooms_handler(State(state): State<AppState>) -> Result<Json<RoomsPayload>, ApiError> {
    Ok(Json(state.cache.rooms_payload().await?))
}

async fn health_handler() -> Json<HealthPayload> {
    Json(HealthPayload::ok_at(Utc::now()))
}

async fn index_handler() -> impl IntoResponse {
    Html(page::DASHBOARD_HTML)
}
