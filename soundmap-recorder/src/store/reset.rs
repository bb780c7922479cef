//! Administrative wipe of the per-user tree
//!
//! A reset runs in two steps. Staging renames the users directory aside and
//! replaces it with an empty one; nothing is deleted yet, so a staged reset
//! can still be undone with [`StagedReset::restore`]. Once the ledger has
//! been reset too, [`StagedReset::purge`] deletes the renamed tree file by
//! file for the report counts.

use serde::Serialize;
use soundmap_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

/// Token the caller must send to confirm a reset
pub const RESET_CONFIRMATION: &str = "DELETE_ALL_DATA";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetReport {
    pub files_deleted: usize,
    pub directories_deleted: usize,
}

/// Reject anything but the exact confirmation token
pub fn check_confirmation(token: &str) -> Result<()> {
    if token == RESET_CONFIRMATION {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "confirmation token mismatch; send \"{}\" to clear all data",
            RESET_CONFIRMATION
        )))
    }
}

/// Users tree moved aside, not yet deleted
#[derive(Debug)]
#[must_use = "a staged reset must be purged or restored"]
pub struct StagedReset {
    users_dir: PathBuf,
    /// `None` when there was no users directory to move
    trash: Option<PathBuf>,
}

/// Swap `users_dir` for an empty directory; caller must hold the store lock
/// exclusively
pub async fn stage_users_dir(users_dir: &Path) -> Result<StagedReset> {
    if !tokio::fs::try_exists(users_dir).await? {
        tokio::fs::create_dir_all(users_dir).await?;
        return Ok(StagedReset {
            users_dir: users_dir.to_path_buf(),
            trash: None,
        });
    }

    let trash = trash_path_for(users_dir);
    tokio::fs::rename(users_dir, &trash).await?;

    if let Err(e) = tokio::fs::create_dir_all(users_dir).await {
        if let Err(restore) = tokio::fs::rename(&trash, users_dir).await {
            warn!(trash = %trash.display(), error = %restore, "Failed to restore users directory");
        }
        return Err(e.into());
    }

    Ok(StagedReset {
        users_dir: users_dir.to_path_buf(),
        trash: Some(trash),
    })
}

impl StagedReset {
    /// Put the original tree back in place
    pub async fn restore(self) -> Result<()> {
        tokio::fs::remove_dir(&self.users_dir).await?;
        if let Some(trash) = &self.trash {
            tokio::fs::rename(trash, &self.users_dir).await?;
        }
        info!(path = %self.users_dir.display(), "Reset rolled back, users directory restored");
        Ok(())
    }

    /// Delete the moved-aside tree
    pub async fn purge(self) -> Result<ResetReport> {
        let Some(trash) = self.trash else {
            return Ok(ResetReport::default());
        };

        let report = tokio::task::spawn_blocking(move || purge_tree(&trash))
            .await
            .map_err(|e| Error::Internal(format!("Purge task failed: {}", e)))?;

        info!(
            files = report.files_deleted,
            directories = report.directories_deleted,
            "Cleared per-user data"
        );
        Ok(report)
    }
}

fn trash_path_for(users_dir: &Path) -> PathBuf {
    let name = users_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "users".to_string());
    users_dir.with_file_name(format!(".{}-reset-{}", name, Uuid::new_v4().simple()))
}

/// Delete files first, then the emptied directories, then the trash root
///
/// Failures are logged; the live store is already empty at this point.
fn purge_tree(trash: &Path) -> ResetReport {
    let mut report = ResetReport::default();

    for entry in WalkDir::new(trash).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Unreadable entry during reset");
                continue;
            }
        };

        if entry.file_type().is_dir() {
            match std::fs::remove_dir(entry.path()) {
                Ok(()) => report.directories_deleted += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove directory"),
            }
        } else {
            match std::fs::remove_file(entry.path()) {
                Ok(()) => report.files_deleted += 1,
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Failed to remove file"),
            }
        }
    }

    if let Err(e) = std::fs::remove_dir(trash) {
        warn!(path = %trash.display(), error = %e, "Failed to remove reset staging directory");
    }

    report
}
