//! Text-to-sound pass-through
//!
//! Stateless: a prompt and optional duration go out, audio bytes come back.
//! The HTTP handler re-encodes the bytes as a data URI.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;
use thiserror::Error;

/// ElevenLabs sound-generation endpoint
const API_URL: &str = "https://api.elevenlabs.io/v1/sound-generation";

/// Accepted duration range in seconds
pub const MIN_DURATION_SECS: f64 = 0.5;
pub const MAX_DURATION_SECS: f64 = 30.0;

#[derive(Debug, Error)]
pub enum SoundGenerationError {
    #[error("Prompt is required")]
    MissingPrompt,

    #[error("Duration must be between 0.5 and 30 seconds")]
    DurationOutOfRange,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Empty audio response")]
    EmptyResponse,
}

impl SoundGenerationError {
    /// Caller mistakes, as opposed to upstream failures
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SoundGenerationError::MissingPrompt | SoundGenerationError::DurationOutOfRange
        )
    }
}

/// Generated audio plus its MIME type
#[derive(Debug, Clone)]
pub struct GeneratedSound {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl GeneratedSound {
    /// `data:<mime>;base64,<payload>`
    pub fn to_data_uri(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.mime_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Check a request before it leaves the process
pub fn validate_request(prompt: &str, duration: Option<f64>) -> Result<(), SoundGenerationError> {
    if prompt.trim().is_empty() {
        return Err(SoundGenerationError::MissingPrompt);
    }
    if let Some(duration) = duration {
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&duration) {
            return Err(SoundGenerationError::DurationOutOfRange);
        }
    }
    Ok(())
}

/// Port for text-to-audio generation
#[async_trait]
pub trait SoundGenerator: Send + Sync {
    /// Generate audio for `prompt`; `None` lets the service pick the length
    async fn generate(
        &self,
        prompt: &str,
        duration_secs: Option<f64>,
    ) -> Result<GeneratedSound, SoundGenerationError>;
}

#[derive(Debug, Serialize)]
struct SoundGenerationRequest<'a> {
    text: &'a str,
    duration_seconds: Option<f64>,
}

/// ElevenLabs-backed generator
pub struct ElevenLabsGenerator {
    api_key: String,
    url: String,
    client: reqwest::Client,
}

impl ElevenLabsGenerator {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_url(api_key, API_URL)
    }

    /// Point at a different endpoint (proxies, tests)
    pub fn with_url(api_key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl SoundGenerator for ElevenLabsGenerator {
    async fn generate(
        &self,
        prompt: &str,
        duration_secs: Option<f64>,
    ) -> Result<GeneratedSound, SoundGenerationError> {
        validate_request(prompt, duration_secs)?;

        let response = self
            .client
            .post(&self.url)
            .header("xi-api-key", &self.api_key)
            .json(&SoundGenerationRequest {
                text: prompt,
                duration_seconds: duration_secs,
            })
            .send()
            .await
            .map_err(|e| SoundGenerationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(SoundGenerationError::InvalidApiKey);
        }
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SoundGenerationError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SoundGenerationError::RequestFailed(e.to_string()))?;
        if bytes.is_empty() {
            return Err(SoundGenerationError::EmptyResponse);
        }

        tracing::info!(bytes = bytes.len(), "Generated sound effect");
        Ok(GeneratedSound {
            mime_type: "audio/mpeg".to_string(),
            bytes: bytes.to_vec(),
        })
    }
}
