//! Front-end page and store media serving
//!
//! `/`, `/compose` and `/record` map to their HTML pages; every other path
//! falls through to the static directory. Recorded media and the ledger are
//! served from the store root at the same relative paths the ledger rows
//! use.

use axum::Router;
use soundmap_common::StoreConfig;
use std::path::Path;
use tower_http::services::{ServeDir, ServeFile};

use crate::AppState;

/// `/<media_prefix>/<user>/<file>` and `/<ledger file name>`
pub fn media_routes(store: &StoreConfig) -> Router<AppState> {
    let prefix = store.media_prefix.trim_matches('/');
    let mut router = Router::new();

    if !prefix.is_empty() {
        router = router.nest_service(&format!("/{}", prefix), ServeDir::new(&store.users_dir));
    }
    if let Some(name) = store.ledger_path.file_name() {
        router = router.route_service(
            &format!("/{}", name.to_string_lossy()),
            ServeFile::new(&store.ledger_path),
        );
    }
    router
}

pub fn ui_routes(static_dir: &Path) -> Router<AppState> {
    Router::new()
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service("/compose", ServeFile::new(static_dir.join("suzhou.html")))
        .route_service("/record", ServeFile::new(static_dir.join("recorder.html")))
        .fallback_service(ServeDir::new(static_dir))
}
