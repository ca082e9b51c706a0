//! Owner locks backed by PostgreSQL advisory locks.

use async_trait::async_trait;
use sqlx::PgPool;

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;
use stash_core::types::OwnerId;

use crate::locks::OwnerGuard;
use crate::traits::OwnerLockManager;

/// First key of the two-key advisory lock space reserved for owner locks.
const OWNER_LOCK_SPACE: i32 = 0x5354_4153;

/// Owner locks shared by every connection to the database.
///
/// Each guard pins one pooled connection inside an open transaction that
/// holds `pg_advisory_xact_lock`; dropping the guard rolls the transaction
/// back, which releases the lock.
#[derive(Debug, Clone)]
pub struct PgOwnerLocks {
    pool: PgPool,
}

impl PgOwnerLocks {
    /// Create a new lock manager.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OwnerLockManager for PgOwnerLocks {
    async fn lock_owner(&self, owner: OwnerId) -> AppResult<OwnerGuard> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin owner lock", e)
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock($1, hashtext($2::text))")
            .bind(OWNER_LOCK_SPACE)
            .bind(owner)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to acquire owner lock", e)
            })?;

        Ok(OwnerGuard::postgres(tx))
    }
}
