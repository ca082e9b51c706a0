//! Hard-deletes trash older than the retention window.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use stash_core::error::ErrorKind;
use stash_core::result::AppResult;
use stash_core::traits::Clock;
use stash_service::TrashService;

use super::PurgeReport;

/// Sweeps expired files, then expired folders.
#[derive(Debug, Clone)]
pub struct TrashPurgeJob {
    trash: TrashService,
    clock: Arc<dyn Clock>,
    running: Arc<Mutex<()>>,
}

impl TrashPurgeJob {
    /// Create a new trash purge job.
    pub fn new(trash: TrashService, clock: Arc<dyn Clock>) -> Self {
        Self {
            trash,
            clock,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Purge every item trashed at or before `now - retention`.
    ///
    /// Item failures are logged and counted; only a failure to list the
    /// candidates fails the sweep. A call made while another sweep is still
    /// running returns an empty report.
    pub async fn run(&self, retention: Duration) -> AppResult<PurgeReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Trash purge still running, skipping this tick");
            return Ok(PurgeReport::default());
        };

        let cutoff = self.clock.now() - retention;
        info!(%cutoff, "Running trash purge");
        let mut report = PurgeReport::default();

        for file in self.trash.expired_files(cutoff).await? {
            match self.trash.purge_expired_file(&file, cutoff).await {
                Ok(true) => report.purged += 1,
                Ok(false) => report.skipped += 1,
                Err(e) if e.is_not_found() => report.skipped += 1,
                Err(e) => {
                    error!(
                        owner_id = %file.owner_id,
                        file_id = %file.id,
                        error = %e,
                        "Failed to purge trashed file"
                    );
                    report.failed += 1;
                }
            }
        }

        for folder in self.trash.expired_folders(cutoff).await? {
            match self.trash.purge_expired_folder(&folder, cutoff).await {
                Ok(true) => report.purged += 1,
                Ok(false) => report.skipped += 1,
                Err(e) if e.is(ErrorKind::Conflict) => {
                    warn!(
                        owner_id = %folder.owner_id,
                        folder_id = %folder.id,
                        reason = %e,
                        "Trashed folder not empty yet, retrying next sweep"
                    );
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(
                        owner_id = %folder.owner_id,
                        folder_id = %folder.id,
                        error = %e,
                        "Failed to purge trashed folder"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            purged = report.purged,
            skipped = report.skipped,
            failed = report.failed,
            "Trash purge finished"
        );
        Ok(report)
    }
}
