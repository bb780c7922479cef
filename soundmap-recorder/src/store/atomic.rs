//! Temp-write-then-rename file replacement
//!
//! The temporary file lives in the destination directory (same filesystem,
//! so the rename is atomic) and is named with a leading dot, which the
//! recording scanner ignores.

use soundmap_common::Result;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Replace `path` with `contents`
///
/// Readers observe either the previous file or the complete new one. On
/// failure the temporary file is removed and the destination is untouched.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let tmp = temp_path_for(path);

    if let Err(e) = write_and_sync(&tmp, contents).await {
        discard(&tmp).await;
        return Err(e.into());
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        discard(&tmp).await;
        return Err(e.into());
    }

    Ok(())
}

async fn write_and_sync(tmp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(tmp).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %tmp.display(), error = %e, "Failed to remove temporary file");
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_name = format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple());
    path.with_file_name(tmp_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_atomic_replaces_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice-0.json");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1, "no temporary files left behind");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("alice-0.json");

        assert!(write_atomic(&path, b"data").await.is_err());
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_temp_path_is_hidden_sibling() {
        let tmp = temp_path_for(Path::new("/store/users/bob/bob-1.webm"));
        assert_eq!(tmp.parent(), Some(Path::new("/store/users/bob")));
        let name = tmp.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with(".bob-1.webm."));
        assert!(name.ends_with(".tmp"));
    }
}
