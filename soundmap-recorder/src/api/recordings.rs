//! Recording submission and listing
//!
//! POST /api/save-recordings, GET /api/get-recordings

use axum::{
    extract::{Multipart, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::store::aggregator::PartPayload;
use crate::store::{
    FailedSlot, LedgerOutcome, Recording, SavedRecording, SkippedSlot, Submission, SubmissionPart,
    DEFAULT_USERNAME,
};
use crate::{ApiError, ApiResult, AppState};

/// POST /api/save-recordings response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecordingsResponse {
    pub success: bool,
    pub message: String,
    pub username: String,
    pub recordings: Vec<SavedRecording>,
    pub skipped: Vec<SkippedSlot>,
    pub failed: Vec<FailedSlot>,
    pub ledger: LedgerOutcome,
}

/// GET /api/get-recordings response
#[derive(Debug, Serialize)]
pub struct RecordingsResponse {
    pub recordings: Vec<Recording>,
}

/// Read every multipart field into a [`Submission`]
///
/// `username` and `timestamp` are top-level fields; everything else is
/// handed to slot aggregation untouched.
async fn read_submission(mut multipart: Multipart) -> ApiResult<Submission> {
    let mut username = None;
    let mut timestamp = None;
    let mut parts = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let is_file = field.file_name().is_some();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read field {}: {}", name, e)))?;

        let payload = if is_file {
            PartPayload::File(bytes)
        } else {
            match String::from_utf8(bytes.to_vec()) {
                Ok(text) => PartPayload::Text(text),
                Err(_) => PartPayload::File(bytes),
            }
        };

        match (name.as_str(), payload) {
            ("username", PartPayload::Text(text)) => username = Some(text),
            ("timestamp", PartPayload::Text(text)) => timestamp = Some(text),
            (_, payload) => parts.push(SubmissionPart { name, payload }),
        }
    }

    let timestamp = timestamp
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("timestamp is required".to_string()))?;

    let username = username
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

    Ok(Submission {
        username,
        timestamp,
        parts,
    })
}

/// POST /api/save-recordings
///
/// **Errors:**
/// - 400: missing `timestamp`, unsafe `username`, malformed body
/// - 500: user directory unusable, or every slot failed to write
///
/// A ledger failure is reported in `ledger` but the request still succeeds.
pub async fn save_recordings(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<SaveRecordingsResponse>> {
    let submission = read_submission(multipart).await?;
    let report = state.store.save_submission(submission).await?;

    if report.saved.is_empty() && !report.failed.is_empty() {
        let reasons: Vec<String> = report
            .failed
            .iter()
            .map(|f| format!("slot {}: {}", f.slot, f.reason))
            .collect();
        return Err(ApiError::Internal(format!(
            "No recordings saved ({})",
            reasons.join("; ")
        )));
    }

    let mut message = format!(
        "Saved {} recording(s) for {}",
        report.saved.len(),
        report.username
    );
    if !report.skipped.is_empty() {
        message.push_str(&format!(", skipped {}", report.skipped.len()));
    }
    if !report.failed.is_empty() {
        message.push_str(&format!(", failed {}", report.failed.len()));
    }
    if report.ledger.is_degraded() {
        message.push_str("; ledger update failed");
    }

    Ok(Json(SaveRecordingsResponse {
        success: report.failed.is_empty(),
        message,
        username: report.username,
        recordings: report.saved,
        skipped: report.skipped,
        failed: report.failed,
        ledger: report.ledger,
    }))
}

/// GET /api/get-recordings
///
/// Empty list when nothing has been saved yet.
pub async fn get_recordings(State(state): State<AppState>) -> ApiResult<Json<RecordingsResponse>> {
    let listing = state.store.list_recordings().await?;
    Ok(Json(RecordingsResponse {
        recordings: listing.recordings,
    }))
}

/// Build recording routes
pub fn recording_routes() -> Router<AppState> {
    Router::new()
        .route("/api/save-recordings", post(save_recordings))
        .route("/api/get-recordings", get(get_recordings))
}
