//! ngo-media library interface
//!
//! Media slot allocation and safe replacement for the NGO site back office.
//! Exposes the services and the router for the binary and integration tests.

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;
pub mod wizard;

pub use crate::error::{ApiError, ApiResult, MediaError, MediaResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use ngo_common::config::TomlConfig;
use ngo_common::events::EventBus;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::db::PictureStore;
use crate::models::PageCatalog;
use crate::services::{BlobStore, BlobUploader, UploadOrchestrator, UploadPolicy, WizardRegistry};

/// Module name used in logs, health output and config file lookup
pub const MODULE_NAME: &str = "ngo-media";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub catalog: Arc<PageCatalog>,
    pub orchestrator: Arc<UploadOrchestrator>,
    pub wizards: WizardRegistry,
    pub event_bus: EventBus,
    /// Directory served under `public_base_url`
    pub media_dir: PathBuf,
    pub public_base_url: String,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        blob_store: Arc<dyn BlobStore>,
        event_bus: EventBus,
        media_dir: PathBuf,
        config: &TomlConfig,
    ) -> Self {
        let catalog = Arc::new(PageCatalog::builtin());
        let store = PictureStore::new(db.clone(), config.database_max_lock_wait_ms);
        let uploader = BlobUploader::new(
            blob_store,
            Duration::from_secs(config.uploads.timeout_secs),
            event_bus.clone(),
        );
        let orchestrator = Arc::new(UploadOrchestrator::new(
            Arc::clone(&catalog),
            store,
            uploader,
            UploadPolicy::from_config(&config.uploads),
            event_bus.clone(),
        ));
        let wizards = WizardRegistry::new(
            Arc::clone(&orchestrator),
            event_bus.clone(),
            &config.wizard,
        );

        Self {
            db,
            catalog,
            orchestrator,
            wizards,
            event_bus,
            media_dir,
            public_base_url: config.uploads.public_base_url.trim_end_matches('/').to_string(),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
///
/// Stored media is served from `media_dir` when the public base URL is a
/// local path; an absolute URL means something else serves it.
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    // Slightly above max_bytes so oversize files reach the policy gate
    let body_limit = state.orchestrator.policy().max_bytes().saturating_add(64 * 1024);

    let mut router = Router::new()
        .merge(api::health_routes())
        .merge(api::page_routes())
        .merge(api::slot_routes())
        .merge(api::picture_routes())
        .merge(api::wizard_routes().layer(DefaultBodyLimit::max(body_limit)))
        .route("/events", get(api::event_stream));

    if state.public_base_url.starts_with('/') && state.public_base_url.len() > 1 {
        router = router.nest_service(&state.public_base_url, ServeDir::new(&state.media_dir));
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
