//! # stash-database
//!
//! Metadata store capabilities used by the storage services, their
//! PostgreSQL implementations, and an in-process store for single-node use
//! and tests.

pub mod connection;
pub mod locks;
pub mod memory;
pub mod migration;
pub mod repositories;
pub mod traits;

use std::sync::Arc;

use tracing::info;

use stash_core::config::{DatabaseConfig, DatabaseProvider};
use stash_core::result::AppResult;

pub use connection::DatabasePool;
pub use locks::OwnerGuard;
pub use memory::MemoryStore;
pub use traits::{
    FileRepository, FolderRepository, OwnerLockManager, QuotaLedger, UploadSessionRepository,
};

use repositories::{
    PgFileRepository, PgFolderRepository, PgOwnerLocks, PgQuotaLedger, PgUploadSessionRepository,
};

/// The set of repositories the services are built from.
#[derive(Debug, Clone)]
pub struct Repositories {
    /// Per-owner quota ledger.
    pub quota: Arc<dyn QuotaLedger>,
    /// Upload sessions and parts.
    pub sessions: Arc<dyn UploadSessionRepository>,
    /// File rows.
    pub files: Arc<dyn FileRepository>,
    /// Folder rows and subtree operations.
    pub folders: Arc<dyn FolderRepository>,
    /// Owner locks shared with every other user of the store.
    pub locks: Arc<dyn OwnerLockManager>,
}

impl Repositories {
    /// Build the repositories for the configured provider, applying
    /// migrations first when enabled.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        match config.provider {
            DatabaseProvider::Postgres => {
                let db = DatabasePool::connect(config).await?;
                if config.run_migrations {
                    migration::run_migrations(db.pool()).await?;
                }
                Ok(Self::postgres(&db))
            }
            DatabaseProvider::Memory => {
                info!("Using in-memory metadata store");
                Ok(Self::memory(MemoryStore::new()))
            }
        }
    }

    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(db: &DatabasePool) -> Self {
        let pool = db.pool().clone();
        Self {
            quota: Arc::new(PgQuotaLedger::new(pool.clone())),
            sessions: Arc::new(PgUploadSessionRepository::new(pool.clone())),
            files: Arc::new(PgFileRepository::new(pool.clone())),
            folders: Arc::new(PgFolderRepository::new(pool.clone())),
            locks: Arc::new(PgOwnerLocks::new(pool)),
        }
    }

    /// Repositories all served by one memory store.
    pub fn memory(store: MemoryStore) -> Self {
        Self {
            quota: Arc::new(store.clone()),
            sessions: Arc::new(store.clone()),
            files: Arc::new(store.clone()),
            folders: Arc::new(store.clone()),
            locks: Arc::new(store),
        }
    }
}
