//! Sound generation pass-through
//!
//! POST /api/generate-sound. Errors use the `{error, details?}` body the
//! front-end pages expect rather than the structured API error.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use crate::services::sound_generator::validate_request;
use crate::AppState;

/// POST /api/generate-sound request
#[derive(Debug, Deserialize)]
pub struct GenerateSoundRequest {
    #[serde(default)]
    pub prompt: String,
    pub duration: Option<f64>,
}

/// POST /api/generate-sound response
#[derive(Debug, Serialize)]
pub struct GenerateSoundResponse {
    pub success: bool,
    /// `data:audio/mpeg;base64,...`
    pub audio: String,
    pub prompt: String,
}

/// POST /api/generate-sound
///
/// **Errors:**
/// - 400: blank prompt, duration outside [0.5, 30]
/// - 503: no generator configured
/// - 500: upstream failure
pub async fn generate_sound(
    State(state): State<AppState>,
    Json(request): Json<GenerateSoundRequest>,
) -> Response {
    if let Err(e) = validate_request(&request.prompt, request.duration) {
        return (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response();
    }

    let Some(generator) = state.sound_generator.as_ref() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "Sound generation is not configured" })),
        )
            .into_response();
    };

    match generator.generate(&request.prompt, request.duration).await {
        Ok(sound) => Json(GenerateSoundResponse {
            success: true,
            audio: sound.to_data_uri(),
            prompt: request.prompt,
        })
        .into_response(),
        Err(e) if e.is_validation() => {
            (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response()
        }
        Err(e) => {
            error!(error = %e, "Sound generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to generate sound effect",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}

/// Build sound generation routes
pub fn sound_routes() -> Router<AppState> {
    Router::new().route("/api/generate-sound", post(generate_sound))
}
