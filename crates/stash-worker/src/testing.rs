//! Shared fixtures for purge job tests.

use std::sync::Arc;

use bytes::Bytes;
use chrono::{Duration, Utc};

use stash_core::config::{QuotaConfig, StorageConfig};
use stash_core::traits::{ByteStream, Clock, ManualClock, StorageProvider};
use stash_core::types::{FolderId, OwnerId};
use stash_database::{MemoryStore, Repositories};
use stash_entity::file::FileRecord;
use stash_entity::folder::{CreateFolder, FolderRecord};
use stash_service::{InitUploadRequest, QuotaService, TrashService, UploadService};
use stash_storage::testing::FaultyStorage;

/// Services over the memory store, a temp dir, and a manual clock.
pub(crate) struct Fixture {
    pub owner: OwnerId,
    pub repos: Repositories,
    pub blobs: Arc<FaultyStorage>,
    pub clock: Arc<ManualClock>,
    pub quota: Arc<QuotaService>,
    pub uploads: UploadService,
    pub trash: TrashService,
    _dir: tempfile::TempDir,
}

impl Fixture {
    pub async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(
            FaultyStorage::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let provider: Arc<dyn StorageProvider> = blobs.clone();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let repos = Repositories::memory(MemoryStore::new());

        let quota = Arc::new(QuotaService::new(
            repos.quota.clone(),
            repos.files.clone(),
            repos.sessions.clone(),
            QuotaConfig::default(),
        ));
        let uploads = UploadService::new(
            repos.sessions.clone(),
            repos.files.clone(),
            repos.folders.clone(),
            quota.clone(),
            provider.clone(),
            clock.clone(),
            StorageConfig::default(),
        );
        let trash = TrashService::new(
            repos.files.clone(),
            repos.folders.clone(),
            quota.clone(),
            provider,
            repos.locks.clone(),
            clock.clone(),
        );

        let owner = OwnerId::new();
        quota.open_account(owner, Some(1_000_000)).await.unwrap();

        Self {
            owner,
            repos,
            blobs,
            clock,
            quota,
            uploads,
            trash,
            _dir: dir,
        }
    }

    pub async fn used(&self) -> i64 {
        self.quota.account(self.owner).await.unwrap().used_bytes
    }

    pub async fn folder(&self, parent: Option<FolderId>, name: &str) -> FolderRecord {
        self.repos
            .folders
            .create(&CreateFolder {
                owner_id: self.owner,
                parent_id: parent,
                name: name.into(),
                created_at: self.clock.now(),
            })
            .await
            .unwrap()
    }

    /// Upload a single-part file of `size` bytes.
    pub async fn file(&self, folder: Option<FolderId>, name: &str, size: usize) -> FileRecord {
        let session = self.open_session(size).await;
        let chunk: ByteStream = Box::pin(futures::stream::iter(vec![Ok(Bytes::from(vec![
            b'z';
            size
        ]))]));
        self.uploads.upload_part(session, 1, chunk).await.unwrap();
        let file = self.uploads.complete(session).await.unwrap();
        if folder.is_some() {
            self.repos
                .files
                .move_to_folder(self.owner, file.id, folder, self.clock.now())
                .await
                .unwrap()
        } else {
            file
        }
    }

    /// Start a single-part upload session of `size` bytes.
    pub async fn open_session(&self, size: usize) -> stash_core::types::SessionId {
        self.uploads
            .init_session(InitUploadRequest {
                owner_id: self.owner,
                folder_id: None,
                name: "upload".into(),
                extension: "bin".into(),
                total_size: size as i64,
                total_parts: 1,
            })
            .await
            .unwrap()
            .id
    }

    /// Move the clock back by `days`, run `f`, then restore it.
    pub async fn days_ago<T, F>(&self, days: i64, f: impl FnOnce() -> F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let now = self.clock.now();
        self.clock.set(now - Duration::days(days));
        let out = f().await;
        self.clock.set(now);
        out
    }
}
