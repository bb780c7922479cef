//! Durable store: per-user recording files plus the shared ledger
//!
//! A save flows aggregator → user store (per slot) → ledger (batch). A
//! listing scans the user tree. A reset wipes both under exclusive locks.

pub mod aggregator;
pub mod atomic;
pub mod ledger;
pub mod locks;
pub mod reader;
pub mod reset;
pub mod user_store;

pub use aggregator::{aggregate, SkipReason, SkippedSlot, SubmissionPart};
pub use ledger::{LedgerAppend, LedgerRow, LedgerWriter, LEDGER_HEADER};
pub use reader::{Listing, Recording, RecordingReader};
pub use reset::{ResetReport, RESET_CONFIRMATION};
pub use user_store::{SavedRecording, UserStore};

use locks::StoreLocks;
use serde::Serialize;
use soundmap_common::{Error, Result, StoreConfig};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Default username when the client sends none
pub const DEFAULT_USERNAME: &str = "user001";

/// How often a listing rechecks a reset in progress
const RESET_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// One inbound save request
#[derive(Debug, Clone)]
pub struct Submission {
    pub username: String,
    pub timestamp: String,
    pub parts: Vec<SubmissionPart>,
}

/// Slot whose metadata could not be written
#[derive(Debug, Clone, Serialize)]
pub struct FailedSlot {
    pub slot: u32,
    pub reason: String,
}

/// Ledger result of a save; a failure here does not fail the save
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum LedgerOutcome {
    Updated { appended: usize, duplicates: usize },
    Failed { reason: String },
}

impl LedgerOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, LedgerOutcome::Failed { .. })
    }
}

/// Per-slot results of one save
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub username: String,
    pub saved: Vec<SavedRecording>,
    pub skipped: Vec<SkippedSlot>,
    pub failed: Vec<FailedSlot>,
    pub ledger: LedgerOutcome,
}

/// Store components sharing one configuration and one set of locks
#[derive(Debug)]
pub struct Store {
    config: StoreConfig,
    users: UserStore,
    ledger: LedgerWriter,
    reader: RecordingReader,
    locks: StoreLocks,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            users: UserStore::new(&config),
            ledger: LedgerWriter::new(&config.ledger_path),
            reader: RecordingReader::new(&config.users_dir),
            locks: StoreLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Create the users directory and the ledger header if missing
    pub async fn initialize(&self) -> Result<()> {
        let _store = self.locks.shared().await;
        tokio::fs::create_dir_all(&self.config.users_dir).await?;
        self.ledger.ensure_exists().await
    }

    /// Persist every complete slot of a submission and record it in the ledger
    ///
    /// Validation errors leave no trace. A slot whose metadata cannot be
    /// written is reported in `failed` while the other slots proceed.
    pub async fn save_submission(&self, submission: Submission) -> Result<SaveReport> {
        let Submission {
            username,
            timestamp,
            parts,
        } = submission;

        user_store::validate_username(&username)?;
        if timestamp.trim().is_empty() {
            return Err(Error::InvalidInput("timestamp is required".to_string()));
        }

        let aggregation = aggregate(parts);
        if aggregation.ignored_fields > 0 {
            debug!(username = %username, ignored = aggregation.ignored_fields, "Ignored unrecognized fields");
        }
        let mut report = SaveReport {
            username: username.clone(),
            saved: Vec::new(),
            skipped: aggregation.skipped,
            failed: Vec::new(),
            ledger: LedgerOutcome::Updated {
                appended: 0,
                duplicates: 0,
            },
        };

        if aggregation.slots.is_empty() {
            info!(username = %username, skipped = report.skipped.len(), "Submission had no complete slots");
            return Ok(report);
        }

        let _store = self.locks.shared().await;
        {
            let _user = self.locks.user(&username).await;
            self.users.ensure_user_directory(&username).await?;

            for slot in &aggregation.slots {
                match self.users.write_slot(&username, &timestamp, slot).await {
                    Ok(saved) => report.saved.push(saved),
                    Err(e) => {
                        warn!(username = %username, slot = slot.slot, error = %e, "Slot not saved");
                        report.failed.push(FailedSlot {
                            slot: slot.slot,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        let rows: Vec<LedgerRow> = report
            .saved
            .iter()
            .filter_map(|saved| {
                let audio_file = saved.audio_file.as_deref()?;
                Some(LedgerRow::for_recording(
                    &self.config.media_prefix,
                    &username,
                    audio_file,
                    saved.photo_file.as_deref(),
                    &saved.description,
                    &saved.metadata,
                ))
            })
            .collect();

        report.ledger = match self.ledger.append_rows(&rows).await {
            Ok(LedgerAppend {
                appended,
                duplicates,
            }) => LedgerOutcome::Updated {
                appended,
                duplicates,
            },
            Err(e) => {
                error!(username = %username, error = %e, "Ledger update failed; recordings are saved");
                LedgerOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        info!(
            username = %username,
            saved = report.saved.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Submission processed"
        );
        Ok(report)
    }

    /// Every recording currently on disk; holds no lock while scanning
    ///
    /// A scan that overlapped a reset is discarded and repeated, so the
    /// result is either the whole pre-reset or the whole post-reset state.
    pub async fn list_recordings(&self) -> Result<Listing> {
        loop {
            let epoch = self.locks.reset_epoch();
            if epoch % 2 == 1 {
                tokio::time::sleep(RESET_POLL_INTERVAL).await;
                continue;
            }

            let listing = self.reader.list_all().await?;
            if self.locks.reset_epoch() == epoch {
                return Ok(listing);
            }
            debug!("Store was reset during the scan, listing again");
        }
    }

    /// Delete all per-user data and reset the ledger to its header
    ///
    /// A wrong token is rejected before any lock is taken or file touched.
    /// If the ledger cannot be reset the users tree is put back and the
    /// store is left as it was.
    pub async fn clear_all(&self, confirmation: &str) -> Result<ResetReport> {
        reset::check_confirmation(confirmation)?;

        let _store = self.locks.exclusive().await;
        let mut ledger = self.ledger.lock().await;

        let staged = {
            let _epoch = self.locks.begin_reset();
            let staged = reset::stage_users_dir(&self.config.users_dir).await?;
            if let Err(e) = ledger.reset().await {
                error!(error = %e, "Ledger reset failed, restoring user data");
                if let Err(restore) = staged.restore().await {
                    error!(error = %restore, "Failed to restore user data after ledger reset failure");
                }
                return Err(e);
            }
            staged
        };

        let report = staged.purge().await?;
        info!(
            files = report.files_deleted,
            directories = report.directories_deleted,
            "Store reset"
        );
        Ok(report)
    }

    /// Regenerate the ledger from the recordings on disk
    ///
    /// Recordings without an audio file get no row.
    pub async fn rebuild_ledger(&self) -> Result<usize> {
        let _store = self.locks.shared().await;
        let mut ledger = self.ledger.lock().await;

        let listing = self.reader.list_all().await?;
        let rows: Vec<LedgerRow> = listing
            .recordings
            .iter()
            .filter_map(|recording| {
                let audio_file = recording.audio_file.as_deref()?;
                Some(LedgerRow::for_recording(
                    &self.config.media_prefix,
                    &recording.username,
                    audio_file,
                    recording.photo_file.as_deref(),
                    &recording.description,
                    &recording.metadata,
                ))
            })
            .collect();

        ledger.replace_all(&rows).await
    }
}
