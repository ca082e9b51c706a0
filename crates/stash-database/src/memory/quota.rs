use async_trait::async_trait;
use chrono::Utc;
use tracing::warn;

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::types::OwnerId;
use stash_entity::account::StorageAccount;

use super::MemoryStore;
use crate::traits::QuotaLedger;

fn missing(owner: OwnerId) -> AppError {
    AppError::not_found(format!("Storage account {owner} not found"))
}

#[async_trait]
impl QuotaLedger for MemoryStore {
    async fn open_account(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&owner) {
            return Err(AppError::conflict(format!(
                "Storage account {owner} already exists"
            )));
        }

        let now = Utc::now();
        let account = StorageAccount {
            owner_id: owner,
            limit_bytes,
            used_bytes: 0,
            created_at: now,
            updated_at: now,
        };
        state.accounts.insert(owner, account.clone());
        Ok(account)
    }

    async fn find_account(&self, owner: OwnerId) -> AppResult<Option<StorageAccount>> {
        Ok(self.state.lock().await.accounts.get(&owner).cloned())
    }

    async fn reserve(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get_mut(&owner).ok_or_else(|| missing(owner))?;

        if account.would_exceed(bytes) {
            return Err(AppError::quota_exceeded(format!(
                "Reserving {bytes} bytes exceeds quota ({} of {} bytes used)",
                account.used_bytes, account.limit_bytes
            )));
        }

        account.used_bytes += bytes;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn release(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get_mut(&owner).ok_or_else(|| missing(owner))?;

        if bytes > account.used_bytes {
            warn!(
                owner_id = %owner,
                used = account.used_bytes,
                release = bytes,
                "Release exceeds usage, clamping to zero"
            );
        }

        account.used_bytes = (account.used_bytes - bytes).max(0);
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn set_used(&self, owner: OwnerId, used_bytes: i64) -> AppResult<StorageAccount> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get_mut(&owner).ok_or_else(|| missing(owner))?;

        if !(0..=account.limit_bytes).contains(&used_bytes) {
            return Err(AppError::validation(format!(
                "Usage {used_bytes} is outside 0..={}",
                account.limit_bytes
            )));
        }

        account.used_bytes = used_bytes;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn set_limit(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount> {
        let mut state = self.state.lock().await;
        let account = state.accounts.get_mut(&owner).ok_or_else(|| missing(owner))?;

        if account.used_bytes > limit_bytes {
            return Err(AppError::conflict(format!(
                "Limit {limit_bytes} is below current usage {}",
                account.used_bytes
            )));
        }

        account.limit_bytes = limit_bytes;
        account.updated_at = Utc::now();
        Ok(account.clone())
    }
}
