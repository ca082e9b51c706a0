//! Interval scheduler for the purge sweeps.

use std::time::Duration;

use tokio_cron_scheduler::{Job, JobScheduler};

use stash_core::config::{TrashConfig, UploadConfig, WorkerConfig};
use stash_core::error::AppError;
use stash_core::result::AppResult;

use crate::jobs::{PurgeReport, TrashPurgeJob, UploadPurgeJob};

/// Runs the trash and upload purges on fixed intervals.
///
/// Nothing runs until [`PurgeScheduler::start`]; [`PurgeScheduler::shutdown`]
/// stops the timers.
pub struct PurgeScheduler {
    scheduler: JobScheduler,
    trash_job: TrashPurgeJob,
    upload_job: UploadPurgeJob,
    worker: WorkerConfig,
    retention: chrono::Duration,
    staleness: chrono::Duration,
    started: bool,
}

impl std::fmt::Debug for PurgeScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PurgeScheduler")
            .field("worker", &self.worker)
            .field("retention", &self.retention)
            .field("staleness", &self.staleness)
            .field("started", &self.started)
            .finish()
    }
}

impl PurgeScheduler {
    /// Create a scheduler for the two purge jobs.
    pub async fn new(
        trash_job: TrashPurgeJob,
        upload_job: UploadPurgeJob,
        worker: WorkerConfig,
        trash: &TrashConfig,
        upload: &UploadConfig,
    ) -> AppResult<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::internal(format!("Failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            trash_job,
            upload_job,
            worker,
            retention: trash.retention(),
            staleness: upload.staleness(),
            started: false,
        })
    }

    /// Register both sweeps and start the timers.
    ///
    /// Does nothing when the worker is disabled in configuration.
    pub async fn start(&mut self) -> AppResult<()> {
        if !self.worker.enabled {
            tracing::info!("Purge scheduler disabled by configuration");
            return Ok(());
        }
        if self.started {
            return Ok(());
        }

        self.register_trash_purge().await?;
        self.register_upload_purge().await?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::internal(format!("Failed to start scheduler: {e}")))?;
        self.started = true;
        tracing::info!("Purge scheduler started");

        if self.worker.run_on_start {
            let trash_job = self.trash_job.clone();
            let upload_job = self.upload_job.clone();
            let (retention, staleness) = (self.retention, self.staleness);
            tokio::spawn(async move {
                if let Err(e) = trash_job.run(retention).await {
                    tracing::error!(error = %e, "Initial trash purge failed");
                }
                if let Err(e) = upload_job.run(staleness).await {
                    tracing::error!(error = %e, "Initial upload purge failed");
                }
            });
        }
        Ok(())
    }

    /// Stop the timers. A sweep that is already running finishes on its own.
    pub async fn shutdown(&mut self) -> AppResult<()> {
        if !self.started {
            return Ok(());
        }
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::internal(format!("Failed to shutdown scheduler: {e}")))?;
        self.started = false;

        tracing::info!("Purge scheduler shut down");
        Ok(())
    }

    /// Whether the timers are running.
    pub fn is_running(&self) -> bool {
        self.started
    }

    /// Run both sweeps now and return their combined report.
    pub async fn run_once(&self) -> AppResult<PurgeReport> {
        let mut report = self.trash_job.run(self.retention).await?;
        report.merge(self.upload_job.run(self.staleness).await?);
        Ok(report)
    }

    async fn register_trash_purge(&self) -> AppResult<()> {
        let every = Duration::from_secs(self.worker.trash_purge_interval_seconds.max(1));
        let job = self.trash_job.clone();
        let retention = self.retention;

        let cron = Job::new_repeated_async(every, move |_uuid, _lock| {
            let job = job.clone();
            Box::pin(async move {
                if let Err(e) = job.run(retention).await {
                    tracing::error!(error = %e, "Trash purge failed");
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create trash_purge schedule: {e}")))?;

        self.scheduler
            .add(cron)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add trash_purge schedule: {e}")))?;

        tracing::info!("Registered: trash_purge (every {}s)", every.as_secs());
        Ok(())
    }

    async fn register_upload_purge(&self) -> AppResult<()> {
        let every = Duration::from_secs(self.worker.upload_purge_interval_seconds.max(1));
        let job = self.upload_job.clone();
        let staleness = self.staleness;

        let cron = Job::new_repeated_async(every, move |_uuid, _lock| {
            let job = job.clone();
            Box::pin(async move {
                if let Err(e) = job.run(staleness).await {
                    tracing::error!(error = %e, "Upload purge failed");
                }
            })
        })
        .map_err(|e| AppError::internal(format!("Failed to create upload_purge schedule: {e}")))?;

        self.scheduler
            .add(cron)
            .await
            .map_err(|e| AppError::internal(format!("Failed to add upload_purge schedule: {e}")))?;

        tracing::info!("Registered: upload_purge (every {}s)", every.as_secs());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as Days;

    use super::*;
    use crate::testing::Fixture;

    async fn scheduler(fx: &Fixture, worker: WorkerConfig) -> PurgeScheduler {
        PurgeScheduler::new(
            TrashPurgeJob::new(fx.trash.clone(), fx.clock.clone()),
            UploadPurgeJob::new(fx.uploads.clone(), fx.clock.clone()),
            worker,
            &TrashConfig::default(),
            &UploadConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_once_sweeps_trash_and_uploads() {
        let fx = Fixture::new().await;
        let file = fx.file(None, "old", 8).await;
        fx.days_ago(31, || fx.trash.soft_delete_file(fx.owner, file.id))
            .await
            .unwrap();
        fx.days_ago(8, || fx.open_session(16)).await;
        assert_eq!(fx.used().await, 24);

        let scheduler = scheduler(&fx, WorkerConfig::default()).await;
        let report = scheduler.run_once().await.unwrap();
        assert_eq!(report.purged, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(fx.used().await, 0);

        fx.clock.advance(Days::days(1));
        assert_eq!(scheduler.run_once().await.unwrap(), PurgeReport::default());
    }

    #[tokio::test]
    async fn test_disabled_scheduler_does_not_start() {
        let fx = Fixture::new().await;
        let worker = WorkerConfig {
            enabled: false,
            ..WorkerConfig::default()
        };
        let mut scheduler = scheduler(&fx, worker).await;
        scheduler.start().await.unwrap();
        assert!(!scheduler.is_running());
        scheduler.shutdown().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_then_shutdown() {
        let fx = Fixture::new().await;
        let mut scheduler = scheduler(&fx, WorkerConfig::default()).await;
        scheduler.start().await.unwrap();
        assert!(scheduler.is_running());
        scheduler.shutdown().await.unwrap();
        assert!(!scheduler.is_running());
    }
}
