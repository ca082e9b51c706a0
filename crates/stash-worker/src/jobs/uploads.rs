//! Reclaims upload sessions abandoned past the staleness window.

use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use stash_core::result::AppResult;
use stash_core::traits::Clock;
use stash_service::UploadService;

use super::PurgeReport;

/// Aborts stale sessions, then removes orphaned working areas.
#[derive(Debug, Clone)]
pub struct UploadPurgeJob {
    uploads: UploadService,
    clock: Arc<dyn Clock>,
    running: Arc<Mutex<()>>,
}

impl UploadPurgeJob {
    /// Create a new upload purge job.
    pub fn new(uploads: UploadService, clock: Arc<dyn Clock>) -> Self {
        Self {
            uploads,
            clock,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// Purge every session created at or before `now - staleness`.
    pub async fn run(&self, staleness: Duration) -> AppResult<PurgeReport> {
        let Ok(_running) = self.running.try_lock() else {
            warn!("Upload purge still running, skipping this tick");
            return Ok(PurgeReport::default());
        };

        let cutoff = self.clock.now() - staleness;
        info!(%cutoff, "Running stale upload purge");
        let mut report = PurgeReport::default();

        for session in self.uploads.stale_sessions(cutoff).await? {
            match self.uploads.purge_session(session.id).await {
                Ok(_) => report.purged += 1,
                // Completed or aborted since it was listed.
                Err(e) if e.is_not_found() => report.skipped += 1,
                Err(e) => {
                    error!(
                        session_id = %session.id,
                        owner_id = %session.owner_id,
                        error = %e,
                        "Failed to purge stale upload session"
                    );
                    report.failed += 1;
                }
            }
        }

        report.orphans_removed = match self.uploads.sweep_orphan_areas(cutoff).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, "Failed to sweep orphaned working areas");
                0
            }
        };

        info!(
            purged = report.purged,
            skipped = report.skipped,
            failed = report.failed,
            orphans_removed = report.orphans_removed,
            "Stale upload purge finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use stash_core::traits::StorageProvider;

    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn test_stale_sessions_are_reclaimed() {
        let fx = Fixture::new().await;
        let stale = fx.days_ago(2, || fx.open_session(100)).await;
        let fresh = fx.open_session(50).await;
        assert_eq!(fx.used().await, 150);

        let job = UploadPurgeJob::new(fx.uploads.clone(), fx.clock.clone());
        let report = job.run(Duration::hours(24)).await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(fx.used().await, 50);

        assert!(fx.repos.sessions.find_by_id(stale).await.unwrap().is_none());
        assert!(fx.repos.sessions.find_by_id(fresh).await.unwrap().is_some());
        assert!(fx.uploads.progress(fresh).await.is_ok());
    }

    #[tokio::test]
    async fn test_session_completed_meanwhile_is_skipped() {
        let fx = Fixture::new().await;
        let session = fx.days_ago(3, || fx.open_session(0)).await;
        let listed = fx.uploads.stale_sessions(fx.clock.now()).await.unwrap();
        assert_eq!(listed.len(), 1);

        fx.uploads
            .upload_part(
                session,
                1,
                Box::pin(futures::stream::iter(vec![Ok(Bytes::new())])),
            )
            .await
            .unwrap();
        fx.uploads.complete(session).await.unwrap();

        let err = fx.uploads.purge_session(session).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_orphaned_working_area_is_removed() {
        let fx = Fixture::new().await;
        let live = fx.open_session(10).await;
        fx.blobs
            .create_dir("uploads/0194b1c2-0000-7000-8000-000000000001")
            .await
            .unwrap();

        fx.clock.advance(Duration::days(3));
        let job = UploadPurgeJob::new(fx.uploads.clone(), fx.clock.clone());
        let report = job.run(Duration::days(7)).await.unwrap();
        assert_eq!(report.purged, 0);
        assert_eq!(report.orphans_removed, 0);

        let report = job.run(Duration::hours(1)).await.unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(report.orphans_removed, 1);
        assert!(fx.repos.sessions.find_by_id(live).await.unwrap().is_none());
        assert!(fx.blobs.list("uploads").await.unwrap().is_empty());
    }
}
