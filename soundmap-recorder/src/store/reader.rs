//! Read side: rebuild recordings from the per-user tree
//!
//! The scan holds no lock. Files that vanish mid-scan (a concurrent reset)
//! are simply missing from the result.

use super::user_store::METADATA_EXT;
use serde::Serialize;
use serde_json::{Map, Value};
use soundmap_common::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Audio extensions in order of preference
const AUDIO_EXTS: [&str; 3] = ["webm", "mp3", "wav"];

/// Photo extensions in order of preference
const PHOTO_EXTS: [&str; 2] = ["jpg", "png"];

/// One persisted slot for one user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recording {
    pub username: String,
    pub recording_number: u32,
    pub metadata: Map<String, Value>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_file: Option<String>,
}

/// Metadata file that could not be turned into a recording
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct Listing {
    /// Sorted by username, then slot
    pub recordings: Vec<Recording>,
    pub skipped: Vec<SkippedFile>,
}

/// Files sharing one `<username>-<slot>` stem
#[derive(Debug, Default)]
struct SlotFiles {
    metadata: Option<PathBuf>,
    audio: Option<(usize, String)>,
    photo: Option<(usize, String)>,
}

impl SlotFiles {
    fn offer(best: &mut Option<(usize, String)>, rank: usize, name: &str) {
        if best.as_ref().map_or(true, |(current, _)| rank < *current) {
            *best = Some((rank, name.to_string()));
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecordingReader {
    users_dir: PathBuf,
}

impl RecordingReader {
    pub fn new(users_dir: impl Into<PathBuf>) -> Self {
        Self {
            users_dir: users_dir.into(),
        }
    }

    /// Scan every user directory; an absent store yields an empty listing
    pub async fn list_all(&self) -> Result<Listing> {
        let users_dir = self.users_dir.clone();
        let listing = tokio::task::spawn_blocking(move || scan(&users_dir))
            .await
            .map_err(|e| Error::Internal(format!("Recording scan task failed: {}", e)))??;

        info!(
            recordings = listing.recordings.len(),
            skipped = listing.skipped.len(),
            "Listed recordings"
        );
        Ok(listing)
    }
}

fn scan(users_dir: &Path) -> Result<Listing> {
    if !users_dir.is_dir() {
        debug!(path = %users_dir.display(), "No store yet, nothing to list");
        return Ok(Listing::default());
    }

    let mut groups: BTreeMap<(String, u32), SlotFiles> = BTreeMap::new();

    for entry in WalkDir::new(users_dir).min_depth(2).max_depth(2) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "Skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let Some(username) = entry
            .path()
            .parent()
            .and_then(Path::file_name)
            .and_then(|n| n.to_str())
        else {
            continue;
        };
        let Some(file_name) = entry.file_name().to_str() else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }
        let Some((slot, ext)) = parse_slot_file(username, file_name) else {
            continue;
        };

        let files = groups.entry((username.to_string(), slot)).or_default();
        if ext == METADATA_EXT {
            files.metadata = Some(entry.path().to_path_buf());
        } else if let Some(rank) = AUDIO_EXTS.iter().position(|e| *e == ext) {
            SlotFiles::offer(&mut files.audio, rank, file_name);
        } else if let Some(rank) = PHOTO_EXTS.iter().position(|e| *e == ext) {
            SlotFiles::offer(&mut files.photo, rank, file_name);
        }
    }

    let mut listing = Listing::default();
    for ((username, slot), files) in groups {
        let Some(path) = files.metadata else {
            continue;
        };

        match read_metadata(&path) {
            Ok(metadata) => {
                let description = metadata
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                listing.recordings.push(Recording {
                    username,
                    recording_number: slot,
                    metadata,
                    description,
                    audio_file: files.audio.map(|(_, name)| name),
                    photo_file: files.photo.map(|(_, name)| name),
                });
            }
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Metadata vanished during scan");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping corrupt metadata file");
                listing.skipped.push(SkippedFile {
                    path,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(listing)
}

/// `<username>-<slot>.<ext>` → (slot, lowercase ext)
fn parse_slot_file(username: &str, file_name: &str) -> Option<(u32, String)> {
    let (stem, ext) = file_name.rsplit_once('.')?;
    let (name, number) = stem.rsplit_once('-')?;
    if name != username || number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((number.parse().ok()?, ext.to_ascii_lowercase()))
}

fn read_metadata(path: &Path) -> Result<Map<String, Value>> {
    let bytes = std::fs::read(path)?;
    match serde_json::from_slice::<Value>(&bytes)? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::InvalidInput("metadata is not a JSON object".to_string())),
    }
}
