//! Quota service: validated access to the ledger plus reconciliation.

use std::sync::Arc;

use tracing::{info, warn};

use stash_core::config::QuotaConfig;
use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::types::OwnerId;
use stash_database::{FileRepository, QuotaLedger, UploadSessionRepository};
use stash_entity::account::StorageAccount;

/// Validates byte counts and forwards to the [`QuotaLedger`].
#[derive(Debug, Clone)]
pub struct QuotaService {
    ledger: Arc<dyn QuotaLedger>,
    files: Arc<dyn FileRepository>,
    sessions: Arc<dyn UploadSessionRepository>,
    config: QuotaConfig,
}

fn non_negative(value: i64, what: &str) -> AppResult<()> {
    if value < 0 {
        return Err(AppError::validation(format!(
            "{what} must not be negative, got {value}"
        )));
    }
    Ok(())
}

impl QuotaService {
    /// Create a new quota service.
    pub fn new(
        ledger: Arc<dyn QuotaLedger>,
        files: Arc<dyn FileRepository>,
        sessions: Arc<dyn UploadSessionRepository>,
        config: QuotaConfig,
    ) -> Self {
        Self {
            ledger,
            files,
            sessions,
            config,
        }
    }

    /// Current ledger state of an owner.
    pub async fn account(&self, owner: OwnerId) -> AppResult<StorageAccount> {
        self.ledger
            .find_account(owner)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Storage account {owner} not found")))
    }

    /// Open an account with `limit_bytes`, or the configured default.
    pub async fn open_account(
        &self,
        owner: OwnerId,
        limit_bytes: Option<i64>,
    ) -> AppResult<StorageAccount> {
        let limit = limit_bytes.unwrap_or(self.config.default_limit_bytes);
        non_negative(limit, "Limit")?;
        let account = self.ledger.open_account(owner, limit).await?;
        info!(owner_id = %owner, limit_bytes = limit, "Opened storage account");
        Ok(account)
    }

    /// Reserve `bytes` against the owner's limit.
    pub async fn reserve(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        non_negative(bytes, "Reservation")?;
        self.ledger.reserve(owner, bytes).await
    }

    /// Return `bytes` to the owner, never dropping below zero.
    pub async fn release(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        non_negative(bytes, "Release")?;
        self.ledger.release(owner, bytes).await
    }

    /// Overwrite the owner's usage.
    pub async fn set_used(&self, owner: OwnerId, used_bytes: i64) -> AppResult<StorageAccount> {
        let account = self.ledger.set_used(owner, used_bytes).await?;
        info!(owner_id = %owner, used_bytes, "Set storage usage");
        Ok(account)
    }

    /// Change the owner's limit.
    pub async fn set_limit(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount> {
        non_negative(limit_bytes, "Limit")?;
        let account = self.ledger.set_limit(owner, limit_bytes).await?;
        info!(owner_id = %owner, limit_bytes, "Changed storage limit");
        Ok(account)
    }

    /// Recompute usage from the metadata store and write it to the ledger.
    ///
    /// Usage is the size of every file row (live and trashed) plus the
    /// declared size of every in-flight upload session. Operations that
    /// reserve or release while this runs may be overwritten, so this is an
    /// administrative repair tool rather than a hot path.
    pub async fn reconcile(&self, owner: OwnerId) -> AppResult<StorageAccount> {
        let account = self.account(owner).await?;
        let stored = self.files.total_size(owner).await?;
        let in_flight: i64 = self
            .sessions
            .list_by_owner(owner)
            .await?
            .iter()
            .map(|s| s.total_size)
            .sum();

        let computed = stored.saturating_add(in_flight);
        let used = if computed > account.limit_bytes {
            warn!(
                owner_id = %owner,
                computed,
                limit = account.limit_bytes,
                "Computed usage exceeds limit, clamping"
            );
            account.limit_bytes
        } else {
            computed
        };

        if used != account.used_bytes {
            info!(
                owner_id = %owner,
                before = account.used_bytes,
                after = used,
                "Reconciled storage usage"
            );
        }
        self.ledger.set_used(owner, used).await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use stash_core::error::ErrorKind;
    use stash_core::types::SessionId;
    use stash_database::MemoryStore;
    use stash_entity::file::CreateFile;
    use stash_entity::upload::CreateUploadSession;

    use super::*;

    fn service(store: &MemoryStore) -> QuotaService {
        QuotaService::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            QuotaConfig {
                default_limit_bytes: 1000,
            },
        )
    }

    #[tokio::test]
    async fn test_reserve_scenario() {
        let store = MemoryStore::new();
        let quota = service(&store);
        let owner = OwnerId::new();
        quota.open_account(owner, None).await.unwrap();

        assert_eq!(quota.reserve(owner, 600).await.unwrap().used_bytes, 600);
        let err = quota.reserve(owner, 500).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(quota.account(owner).await.unwrap().used_bytes, 600);

        assert_eq!(quota.release(owner, 600).await.unwrap().used_bytes, 0);
        assert_eq!(quota.reserve(owner, 500).await.unwrap().used_bytes, 500);
    }

    #[tokio::test]
    async fn test_negative_amounts_are_rejected() {
        let store = MemoryStore::new();
        let quota = service(&store);
        let owner = OwnerId::new();
        quota.open_account(owner, None).await.unwrap();

        assert_eq!(quota.reserve(owner, -1).await.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(quota.release(owner, -1).await.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(quota.reserve(owner, 0).await.unwrap().used_bytes, 0);
        let missing = quota.reserve(OwnerId::new(), 0).await.unwrap_err();
        assert_eq!(missing.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_reconcile_counts_files_and_sessions() {
        let store = MemoryStore::new();
        let quota = service(&store);
        let owner = OwnerId::new();
        quota.open_account(owner, None).await.unwrap();
        quota.set_used(owner, 999).await.unwrap();

        FileRepository::create(
            &store,
            &CreateFile {
                owner_id: owner,
                folder_id: None,
                name: "a".into(),
                extension: String::new(),
                size_bytes: 120,
                physical_key: "objects/a".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        UploadSessionRepository::create(
            &store,
            &CreateUploadSession {
                id: SessionId::new(),
                owner_id: owner,
                folder_id: None,
                name: "b".into(),
                extension: String::new(),
                total_size: 80,
                total_parts: 1,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        assert_eq!(quota.reconcile(owner).await.unwrap().used_bytes, 200);

        quota.set_limit(owner, 200).await.unwrap();
        FileRepository::create(
            &store,
            &CreateFile {
                owner_id: owner,
                folder_id: None,
                name: "c".into(),
                extension: String::new(),
                size_bytes: 50,
                physical_key: "objects/c".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();
        assert_eq!(quota.reconcile(owner).await.unwrap().used_bytes, 200);
    }
}
