//! Administrative store operations
//!
//! POST /api/clear-all-data, POST /api/rebuild-ledger

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ApiResult, AppState};

/// POST /api/clear-all-data request
#[derive(Debug, Deserialize)]
pub struct ClearAllRequest {
    #[serde(default)]
    pub confirm: String,
    pub environment: Option<String>,
}

/// POST /api/clear-all-data response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearAllResponse {
    pub success: bool,
    pub message: String,
    pub files_deleted: usize,
    pub directories_deleted: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

/// POST /api/rebuild-ledger response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildLedgerResponse {
    pub success: bool,
    pub rows_written: usize,
    pub timestamp: DateTime<Utc>,
}

/// POST /api/clear-all-data
///
/// **Request:** `{"confirm": "DELETE_ALL_DATA", "environment": "staging"}`
///
/// **Errors:**
/// - 400: confirmation token mismatch (nothing is touched)
/// - 500: filesystem failure while clearing
pub async fn clear_all_data(
    State(state): State<AppState>,
    Json(request): Json<ClearAllRequest>,
) -> ApiResult<Json<ClearAllResponse>> {
    let environment = request.environment;
    let report = state
        .store
        .clear_all(&request.confirm)
        .await
        .inspect_err(|e| warn!(environment = ?environment, error = %e, "Clear-all request refused or failed"))?;

    info!(
        environment = ?environment,
        files = report.files_deleted,
        directories = report.directories_deleted,
        "All recording data cleared"
    );

    Ok(Json(ClearAllResponse {
        success: true,
        message: format!(
            "Deleted {} file(s) in {} user director{}",
            report.files_deleted,
            report.directories_deleted,
            if report.directories_deleted == 1 { "y" } else { "ies" }
        ),
        files_deleted: report.files_deleted,
        directories_deleted: report.directories_deleted,
        timestamp: Utc::now(),
        environment,
    }))
}

/// POST /api/rebuild-ledger
///
/// Rewrites the ledger from the recordings on disk.
pub async fn rebuild_ledger(State(state): State<AppState>) -> ApiResult<Json<RebuildLedgerResponse>> {
    let rows_written = state.store.rebuild_ledger().await?;
    Ok(Json(RebuildLedgerResponse {
        success: true,
        rows_written,
        timestamp: Utc::now(),
    }))
}

/// Build admin routes
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/api/clear-all-data", post(clear_all_data))
        .route("/api/rebuild-ledger", post(rebuild_ledger))
}
