//! Quota ledger backed by `storage_accounts`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;
use stash_core::types::OwnerId;
use stash_entity::account::StorageAccount;

use crate::traits::QuotaLedger;

/// Ledger that serializes every mutation of an account behind
/// `SELECT ... FOR UPDATE` inside a transaction.
#[derive(Debug, Clone)]
pub struct PgQuotaLedger {
    pool: PgPool,
}

impl PgQuotaLedger {
    /// Create a new ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin quota transaction", e)
        })
    }

    /// Lock the account row for the rest of the transaction.
    async fn lock_account(
        tx: &mut Transaction<'static, Postgres>,
        owner: OwnerId,
    ) -> AppResult<StorageAccount> {
        sqlx::query_as::<_, StorageAccount>(
            "SELECT * FROM storage_accounts WHERE owner_id = $1 FOR UPDATE",
        )
        .bind(owner)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock account", e))?
        .ok_or_else(|| AppError::not_found(format!("Storage account {owner} not found")))
    }

    async fn write_used(
        tx: &mut Transaction<'static, Postgres>,
        owner: OwnerId,
        used_bytes: i64,
    ) -> AppResult<StorageAccount> {
        sqlx::query_as::<_, StorageAccount>(
            "UPDATE storage_accounts SET used_bytes = $2, updated_at = NOW() \
             WHERE owner_id = $1 RETURNING *",
        )
        .bind(owner)
        .bind(used_bytes)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update usage", e))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit quota transaction", e)
        })
    }
}

#[async_trait]
impl QuotaLedger for PgQuotaLedger {
    async fn open_account(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount> {
        sqlx::query_as::<_, StorageAccount>(
            "INSERT INTO storage_accounts (owner_id, limit_bytes, used_bytes) \
             VALUES ($1, $2, 0) RETURNING *",
        )
        .bind(owner)
        .bind(limit_bytes)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("storage_accounts_pkey") =>
            {
                AppError::conflict(format!("Storage account {owner} already exists"))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to open account", e),
        })
    }

    async fn find_account(&self, owner: OwnerId) -> AppResult<Option<StorageAccount>> {
        sqlx::query_as::<_, StorageAccount>("SELECT * FROM storage_accounts WHERE owner_id = $1")
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find account", e))
    }

    async fn reserve(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        let mut tx = self.begin().await?;
        let account = Self::lock_account(&mut tx, owner).await?;

        if account.would_exceed(bytes) {
            return Err(AppError::quota_exceeded(format!(
                "Reserving {bytes} bytes exceeds quota ({} of {} bytes used)",
                account.used_bytes, account.limit_bytes
            )));
        }

        let updated = Self::write_used(&mut tx, owner, account.used_bytes + bytes).await?;
        Self::commit(tx).await?;
        Ok(updated)
    }

    async fn release(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        let mut tx = self.begin().await?;
        let account = Self::lock_account(&mut tx, owner).await?;

        if bytes > account.used_bytes {
            warn!(
                owner_id = %owner,
                used = account.used_bytes,
                release = bytes,
                "Release exceeds usage, clamping to zero"
            );
        }

        let updated = Self::write_used(&mut tx, owner, (account.used_bytes - bytes).max(0)).await?;
        Self::commit(tx).await?;
        Ok(updated)
    }

    async fn set_used(&self, owner: OwnerId, used_bytes: i64) -> AppResult<StorageAccount> {
        let mut tx = self.begin().await?;
        let account = Self::lock_account(&mut tx, owner).await?;

        if !(0..=account.limit_bytes).contains(&used_bytes) {
            return Err(AppError::validation(format!(
                "Usage {used_bytes} is outside 0..={}",
                account.limit_bytes
            )));
        }

        let updated = Self::write_used(&mut tx, owner, used_bytes).await?;
        Self::commit(tx).await?;
        Ok(updated)
    }

    async fn set_limit(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount> {
        let mut tx = self.begin().await?;
        let account = Self::lock_account(&mut tx, owner).await?;

        if account.used_bytes > limit_bytes {
            return Err(AppError::conflict(format!(
                "Limit {limit_bytes} is below current usage {}",
                account.used_bytes
            )));
        }

        let updated = sqlx::query_as::<_, StorageAccount>(
            "UPDATE storage_accounts SET limit_bytes = $2, updated_at = NOW() \
             WHERE owner_id = $1 RETURNING *",
        )
        .bind(owner)
        .bind(limit_bytes)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to update limit", e))?;

        Self::commit(tx).await?;
        Ok(updated)
    }
}
