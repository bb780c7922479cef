//! Per-user directory tree
//!
//! Layout: `<users_dir>/<username>/<username>-<slot>.{json,webm,jpg}`.
//! Files for a (username, slot) are replaced on resubmission, never
//! versioned.

use super::aggregator::CompleteSlot;
use super::atomic::write_atomic;
use serde::Serialize;
use serde_json::{Map, Value};
use soundmap_common::{Error, Result, StoreConfig};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const METADATA_EXT: &str = "json";
pub const AUDIO_EXT: &str = "webm";
pub const PHOTO_EXT: &str = "jpg";

const MAX_USERNAME_CHARS: usize = 64;

/// Reject usernames that are unsafe as a single path component
///
/// Allowed: ASCII letters and digits plus `-`, `_` and `.`, not leading `.`.
pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(Error::InvalidInput("username must not be empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_CHARS {
        return Err(Error::InvalidInput(format!(
            "username longer than {} characters",
            MAX_USERNAME_CHARS
        )));
    }
    if username.starts_with('.') {
        return Err(Error::InvalidInput(format!(
            "username must not start with '.': {:?}",
            username
        )));
    }
    if let Some(bad) = username
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(Error::InvalidInput(format!(
            "username contains forbidden character {:?}",
            bad
        )));
    }
    Ok(())
}

/// `<username>-<slot>`, shared by all files of one slot
pub fn slot_stem(username: &str, slot: u32) -> String {
    format!("{}-{}", username, slot)
}

/// Outcome of persisting one slot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedRecording {
    pub slot: u32,
    /// Audio file name when one exists, otherwise the metadata file name
    pub filename: String,
    pub metadata: Map<String, Value>,
    pub description: String,
    pub has_photo: bool,
    pub has_audio: bool,
    /// Binary writes that failed after the metadata was committed
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip)]
    pub audio_file: Option<String>,
    #[serde(skip)]
    pub photo_file: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserStore {
    users_dir: PathBuf,
}

impl UserStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            users_dir: config.users_dir.clone(),
        }
    }

    /// Directory for a validated username
    pub fn user_dir(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        Ok(self.users_dir.join(username))
    }

    /// Create the per-user directory if absent
    pub async fn ensure_user_directory(&self, username: &str) -> Result<PathBuf> {
        let dir = self.user_dir(username)?;
        if !tokio::fs::try_exists(&dir).await? {
            tokio::fs::create_dir_all(&dir).await?;
            info!(username, path = %dir.display(), "Created user directory");
        }
        Ok(dir)
    }

    /// Persist one slot
    ///
    /// Metadata is written first; its failure fails the slot. Audio and
    /// photo failures after that are recorded as warnings and leave any
    /// previous binary in place. Binaries absent from the submission are
    /// not touched.
    pub async fn write_slot(
        &self,
        username: &str,
        timestamp: &str,
        slot: &CompleteSlot,
    ) -> Result<SavedRecording> {
        let dir = self.ensure_user_directory(username).await?;
        let stem = slot_stem(username, slot.slot);

        let metadata = merge_metadata(&slot.metadata, &slot.description, slot.slot, timestamp);
        let metadata_file = format!("{}.{}", stem, METADATA_EXT);
        let encoded = serde_json::to_vec_pretty(&Value::Object(metadata.clone()))?;
        write_atomic(&dir.join(&metadata_file), &encoded).await?;

        let mut warnings = Vec::new();
        let audio_file = format!("{}.{}", stem, AUDIO_EXT);
        let photo_file = format!("{}.{}", stem, PHOTO_EXT);

        for (payload, file_name, label) in [
            (&slot.audio, &audio_file, "audio"),
            (&slot.photo, &photo_file, "photo"),
        ] {
            let Some(bytes) = payload else { continue };
            if let Err(e) = write_atomic(&dir.join(file_name), bytes).await {
                warn!(username, slot = slot.slot, error = %e, "Failed to write {}", label);
                warnings.push(format!("{} not saved: {}", label, e));
            } else {
                debug!(username, slot = slot.slot, bytes = bytes.len(), "Wrote {}", label);
            }
        }

        let audio_file = exists(&dir.join(&audio_file)).await.then_some(audio_file);
        let photo_file = exists(&dir.join(&photo_file)).await.then_some(photo_file);

        info!(
            username,
            slot = slot.slot,
            has_audio = audio_file.is_some(),
            has_photo = photo_file.is_some(),
            "Saved recording slot"
        );

        Ok(SavedRecording {
            slot: slot.slot,
            filename: audio_file.clone().unwrap_or(metadata_file),
            metadata,
            description: slot.description.clone(),
            has_photo: photo_file.is_some(),
            has_audio: audio_file.is_some(),
            warnings,
            audio_file,
            photo_file,
        })
    }
}

/// Client metadata plus the injected `description`, `slotNumber` and
/// `timestamp` keys, which override client values of the same name
pub fn merge_metadata(
    metadata: &Map<String, Value>,
    description: &str,
    slot: u32,
    timestamp: &str,
) -> Map<String, Value> {
    let mut merged = metadata.clone();
    merged.insert("description".to_string(), Value::from(description));
    merged.insert("slotNumber".to_string(), Value::from(slot));
    merged.insert("timestamp".to_string(), Value::from(timestamp));
    merged
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
