//! Shared fixtures for service tests.

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use stash_core::config::{QuotaConfig, StorageConfig};
use stash_core::traits::{ByteStream, ManualClock, StorageProvider};
use stash_core::types::OwnerId;
use stash_database::{MemoryStore, Repositories};
use stash_storage::testing::FaultyStorage;

use crate::file::FileService;
use crate::quota::QuotaService;
use crate::trash::TrashService;
use crate::upload::UploadService;

/// A fully wired set of services over the memory store and a temp dir.
pub(crate) struct Harness {
    pub owner: OwnerId,
    pub repos: Repositories,
    pub storage: Arc<FaultyStorage>,
    pub provider: Arc<dyn StorageProvider>,
    pub clock: Arc<ManualClock>,
    pub quota: Arc<QuotaService>,
    pub uploads: UploadService,
    pub files: FileService,
    pub trash: TrashService,
    _dir: tempfile::TempDir,
}

impl Harness {
    /// Build the services and open an account with `limit` bytes.
    pub async fn new(limit: i64) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(
            FaultyStorage::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let provider: Arc<dyn StorageProvider> = storage.clone();
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
        let files = FileService::new(
            repos.files.clone(),
            repos.folders.clone(),
            quota.clone(),
            provider.clone(),
            repos.locks.clone(),
            clock.clone(),
            StorageConfig::default(),
        );
        let trash = TrashService::new(
            repos.files.clone(),
            repos.folders.clone(),
            quota.clone(),
            provider.clone(),
            repos.locks.clone(),
            clock.clone(),
        );

        let owner = OwnerId::new();
        quota.open_account(owner, Some(limit)).await.unwrap();

        Self {
            owner,
            repos,
            storage,
            provider,
            clock,
            quota,
            uploads,
            files,
            trash,
            _dir: dir,
        }
    }

    /// A separate trash service over the same store and storage, as another
    /// node would build it.
    pub fn trash_service(&self) -> TrashService {
        TrashService::new(
            self.repos.files.clone(),
            self.repos.folders.clone(),
            self.quota.clone(),
            self.provider.clone(),
            self.repos.locks.clone(),
            self.clock.clone(),
        )
    }

    pub async fn used(&self) -> i64 {
        self.quota.account(self.owner).await.unwrap().used_bytes
    }

    pub async fn store_sessions(&self) -> usize {
        self.repos.sessions.list_by_owner(self.owner).await.unwrap().len()
    }
}

/// A request body made of one chunk.
pub(crate) fn body(data: Vec<u8>) -> ByteStream {
    Box::pin(futures::stream::iter(vec![Ok(Bytes::from(data))]))
}
