//! Shared summary ledger (`imagedata.csv`)
//!
//! The ledger is owned by a single [`LedgerWriter`]. Every read-modify-write
//! cycle runs while holding its mutex, through a [`LedgerGuard`], so no two
//! appends (or an append and a reset) can overlap.
//!
//! At most one row exists per distinct `audio` column value.

use super::atomic::write_atomic;
use serde::Serialize;
use serde_json::{Map, Value};
use soundmap_common::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Header row of a fresh ledger
pub const LEDGER_HEADER: &str = "src,bgc,audio,describ,title";

/// Column holding the dedup key
const AUDIO_COLUMN: usize = 2;

/// One summary line consumed by the rendering surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub photo_path: String,
    pub bgc_path: String,
    pub audio_path: String,
    pub description: String,
    pub title: String,
}

impl LedgerRow {
    /// Row for a persisted recording
    ///
    /// Paths are `<prefix>/<username>/<file>`. `bgc` repeats the photo path.
    /// An empty description falls back to the metadata `tags` joined with
    /// `"; "`.
    pub fn for_recording(
        media_prefix: &str,
        username: &str,
        audio_file: &str,
        photo_file: Option<&str>,
        description: &str,
        metadata: &Map<String, Value>,
    ) -> Self {
        let media_path = |file: &str| {
            if media_prefix.is_empty() {
                format!("{}/{}", username, file)
            } else {
                format!("{}/{}/{}", media_prefix.trim_end_matches('/'), username, file)
            }
        };
        let photo_path = photo_file.map(&media_path).unwrap_or_default();

        Self {
            bgc_path: photo_path.clone(),
            photo_path,
            audio_path: media_path(audio_file),
            description: describ_text(description, metadata),
            title: username.to_string(),
        }
    }

    /// Encode as one CSV line (no trailing newline)
    pub fn to_csv_line(&self) -> String {
        [
            &self.photo_path,
            &self.bgc_path,
            &self.audio_path,
            &self.description,
            &self.title,
        ]
        .iter()
        .map(|field| escape_field(field))
        .collect::<Vec<_>>()
        .join(",")
    }
}

fn describ_text(description: &str, metadata: &Map<String, Value>) -> String {
    if !description.trim().is_empty() {
        return description.to_string();
    }
    metadata
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default()
}

/// Quote a field when needed; line breaks become spaces so every record
/// stays on a single line
fn escape_field(field: &str) -> String {
    let flat: String = field
        .chars()
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect();

    if flat.contains(',') || flat.contains('"') {
        format!("\"{}\"", flat.replace('"', "\"\""))
    } else {
        flat
    }
}

/// Split one CSV line, honouring double-quoted fields
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', true) => in_quotes = false,
            ('"', false) if current.is_empty() => in_quotes = true,
            (',', false) => fields.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Counts from one append; duplicates are informational, not errors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LedgerAppend {
    pub appended: usize,
    pub duplicates: usize,
}

/// Parsed ledger content
struct LedgerContent {
    /// Existing text, trailing line breaks removed
    text: String,
    audio_paths: HashSet<String>,
    /// False when the file was absent or empty
    existed: bool,
}

impl LedgerContent {
    fn parse(text: String) -> Self {
        let audio_paths = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .skip(1)
            .filter_map(|line| split_line(line).into_iter().nth(AUDIO_COLUMN))
            .filter(|audio| !audio.is_empty())
            .collect();

        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return Self::fresh();
        }

        Self {
            text: text.to_string(),
            audio_paths,
            existed: true,
        }
    }

    fn fresh() -> Self {
        Self {
            text: LEDGER_HEADER.to_string(),
            audio_paths: HashSet::new(),
            existed: false,
        }
    }
}

/// Single owner of the ledger file
#[derive(Debug)]
pub struct LedgerWriter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl LedgerWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire exclusive access to the ledger
    pub async fn lock(&self) -> LedgerGuard<'_> {
        LedgerGuard {
            path: &self.path,
            _guard: self.lock.lock().await,
        }
    }

    /// Append rows whose audio path is not yet present
    pub async fn append_rows(&self, rows: &[LedgerRow]) -> Result<LedgerAppend> {
        self.lock().await.append_rows(rows).await
    }

    /// Create the ledger with its header if it does not exist
    pub async fn ensure_exists(&self) -> Result<()> {
        let guard = self.lock().await;
        if !tokio::fs::try_exists(guard.path).await? {
            write_atomic(guard.path, LEDGER_HEADER.as_bytes()).await?;
            info!(path = %guard.path.display(), "Initialized ledger");
        }
        Ok(())
    }
}

/// Exclusive handle on the ledger; released on drop
pub struct LedgerGuard<'a> {
    path: &'a Path,
    _guard: MutexGuard<'a, ()>,
}

impl LedgerGuard<'_> {
    async fn load(&self) -> Result<LedgerContent> {
        match tokio::fs::read_to_string(self.path).await {
            Ok(text) => Ok(LedgerContent::parse(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LedgerContent::fresh()),
            Err(e) => Err(e.into()),
        }
    }

    /// Read, merge and write back in one cycle
    pub async fn append_rows(&mut self, rows: &[LedgerRow]) -> Result<LedgerAppend> {
        let mut content = self.load().await?;
        let mut result = LedgerAppend::default();

        for row in rows {
            if !content.audio_paths.insert(row.audio_path.clone()) {
                debug!(audio = %row.audio_path, "Ledger row already present, skipping");
                result.duplicates += 1;
                continue;
            }
            content.text.push('\n');
            content.text.push_str(&row.to_csv_line());
            result.appended += 1;
        }

        if result.appended > 0 || !content.existed {
            write_atomic(self.path, content.text.as_bytes()).await?;
        }

        info!(
            appended = result.appended,
            duplicates = result.duplicates,
            "Ledger updated"
        );
        Ok(result)
    }

    /// Replace the ledger with only its header row
    pub async fn reset(&mut self) -> Result<()> {
        write_atomic(self.path, LEDGER_HEADER.as_bytes()).await?;
        info!(path = %self.path.display(), "Ledger reset to header");
        Ok(())
    }

    /// Rewrite the ledger from scratch; returns the number of rows written
    pub async fn replace_all(&mut self, rows: &[LedgerRow]) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut text = LEDGER_HEADER.to_string();

        for row in rows {
            if seen.insert(row.audio_path.as_str()) {
                text.push('\n');
                text.push_str(&row.to_csv_line());
            }
        }

        write_atomic(self.path, text.as_bytes()).await?;
        info!(rows = seen.len(), "Ledger rebuilt");
        Ok(seen.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn row(user: &str, slot: u32, description: &str) -> LedgerRow {
        LedgerRow::for_recording(
            "users",
            user,
            &format!("{}-{}.webm", user, slot),
            None,
            description,
            &Map::new(),
        )
    }

    fn data_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_row_matches_documented_example() {
        assert_eq!(row("alice", 0, "hi").to_csv_line(), ",,users/alice/alice-0.webm,hi,alice");
    }

    #[test]
    fn test_photo_fills_src_and_bgc() {
        let row = LedgerRow::for_recording(
            "users",
            "bo",
            "bo-1.webm",
            Some("bo-1.jpg"),
            "x",
            &Map::new(),
        );
        assert_eq!(
            row.to_csv_line(),
            "users/bo/bo-1.jpg,users/bo/bo-1.jpg,users/bo/bo-1.webm,x,bo"
        );
    }

    #[test]
    fn test_empty_description_falls_back_to_tags() {
        let Value::Object(metadata) = json!({"tags": ["water", "birds"]}) else { unreachable!() };
        let row = LedgerRow::for_recording("users", "a", "a-0.webm", None, "", &metadata);
        assert_eq!(row.description, "water; birds");
    }

    #[test]
    fn test_fields_with_commas_and_quotes_survive_split() {
        let line = row("alice", 0, "rain, \"heavy\"\nthunder").to_csv_line();
        assert!(!line.contains('\n'));

        let fields = split_line(&line);
        assert_eq!(fields.len(), 5);
        assert_eq!(fields[2], "users/alice/alice-0.webm");
        assert_eq!(fields[3], "rain, \"heavy\" thunder");
    }

    #[tokio::test]
    async fn test_absent_ledger_gets_header() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerWriter::new(dir.path().join("imagedata.csv"));

        let result = ledger.append_rows(&[row("alice", 0, "hi")]).await.unwrap();
        assert_eq!(result, LedgerAppend { appended: 1, duplicates: 0 });

        let text = std::fs::read_to_string(ledger.path()).unwrap();
        assert_eq!(text, "src,bgc,audio,describ,title\n,,users/alice/alice-0.webm,hi,alice");
    }

    #[tokio::test]
    async fn test_duplicate_audio_paths_are_skipped() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerWriter::new(dir.path().join("imagedata.csv"));

        ledger.append_rows(&[row("alice", 0, "first")]).await.unwrap();
        let result = ledger
            .append_rows(&[row("alice", 0, "second"), row("alice", 1, "new"), row("alice", 1, "again")])
            .await
            .unwrap();

        assert_eq!(result, LedgerAppend { appended: 1, duplicates: 2 });
        let lines = data_lines(ledger.path());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(",first,alice"));
    }

    #[tokio::test]
    async fn test_existing_rows_written_by_other_tools_are_respected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imagedata.csv");
        std::fs::write(
            &path,
            "src,bgc,audio,describ,title\n\"a.jpg\",a.jpg,users/x/x-1.webm,\"q, r\",x\n\n",
        )
        .unwrap();
        let ledger = LedgerWriter::new(&path);

        let result = ledger
            .append_rows(&[row("x", 1, "dup"), row("x", 2, "fresh")])
            .await
            .unwrap();

        assert_eq!(result, LedgerAppend { appended: 1, duplicates: 1 });
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("\"q, r\",x\n,,users/x/x-2.webm,fresh,x"));
    }

    #[tokio::test]
    async fn test_nothing_new_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("imagedata.csv");
        let original = "src,bgc,audio,describ,title\n,,users/a/a-0.webm,hi,a\n";
        std::fs::write(&path, original).unwrap();

        let ledger = LedgerWriter::new(&path);
        ledger.append_rows(&[row("a", 0, "hi")]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[tokio::test]
    async fn test_concurrent_appends_lose_no_rows() {
        let dir = TempDir::new().unwrap();
        let ledger = Arc::new(LedgerWriter::new(dir.path().join("imagedata.csv")));

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let ledger = Arc::clone(&ledger);
                tokio::spawn(async move {
                    ledger
                        .append_rows(&[row(&format!("user{}", i), 0, "c"), row("shared", 0, "c")])
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut appended = 0;
        for task in tasks {
            appended += task.await.unwrap().appended;
        }

        assert_eq!(appended, 17);
        assert_eq!(data_lines(ledger.path()).len(), 17);
    }

    #[tokio::test]
    async fn test_reset_and_replace_all() {
        let dir = TempDir::new().unwrap();
        let ledger = LedgerWriter::new(dir.path().join("imagedata.csv"));
        ledger.append_rows(&[row("a", 0, "x")]).await.unwrap();

        ledger.lock().await.reset().await.unwrap();
        assert_eq!(std::fs::read_to_string(ledger.path()).unwrap(), LEDGER_HEADER);

        let written = ledger
            .lock()
            .await
            .replace_all(&[row("a", 0, "x"), row("a", 0, "y"), row("b", 3, "z")])
            .await
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(data_lines(ledger.path()).len(), 2);
    }
}
