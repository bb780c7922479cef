//! soundmap-recorder library
//!
//! Accepts batched recording submissions, persists them per user and keeps
//! the shared ledger in step with the files on disk.

pub mod api;
pub mod cli;
pub mod error;
pub mod services;
pub mod store;

pub use crate::error::{ApiError, ApiResult};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use services::SoundGenerator;
use soundmap_common::config::DEFAULT_MAX_UPLOAD_BYTES;
use std::path::PathBuf;
use std::sync::Arc;
use store::Store;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Recording files and ledger
    pub store: Arc<Store>,
    /// Text-to-sound collaborator; `None` when no API key is configured
    pub sound_generator: Option<Arc<dyn SoundGenerator>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Front-end pages, served when present
    pub static_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(store: Store, sound_generator: Option<Arc<dyn SoundGenerator>>) -> Self {
        Self {
            store: Arc::new(store),
            sound_generator,
            startup_time: Utc::now(),
            static_dir: None,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }

    pub fn with_static_dir(mut self, static_dir: Option<PathBuf>) -> Self {
        self.static_dir = static_dir;
        self
    }

    pub fn with_max_upload_bytes(mut self, max_upload_bytes: usize) -> Self {
        self.max_upload_bytes = max_upload_bytes;
        self
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(api::recording_routes())
        .merge(api::admin_routes())
        .merge(api::sound_routes())
        .merge(api::health_routes())
        .merge(api::media_routes(state.store.config()));

    if let Some(dir) = &state.static_dir {
        router = router.merge(api::ui_routes(dir));
    }

    router
        .layer(DefaultBodyLimit::max(state.max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
