//! Owner locks held by the metadata store.
//!
//! The lock lives wherever the metadata lives, so every process sharing a
//! store (server nodes, the admin CLI) contends on the same lock.

use sqlx::{Postgres, Transaction};
use tokio::sync::OwnedMutexGuard;

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;

/// A held owner lock. The lock is released when the guard drops.
#[must_use = "the owner lock is released as soon as the guard is dropped"]
pub struct OwnerGuard {
    held: Held,
}

enum Held {
    Memory(OwnedMutexGuard<()>),
    /// Transaction holding `pg_advisory_xact_lock`; rolled back on drop.
    Postgres(Transaction<'static, Postgres>),
}

impl OwnerGuard {
    pub(crate) fn memory(guard: OwnedMutexGuard<()>) -> Self {
        Self {
            held: Held::Memory(guard),
        }
    }

    pub(crate) fn postgres(tx: Transaction<'static, Postgres>) -> Self {
        Self {
            held: Held::Postgres(tx),
        }
    }

    /// Release the lock now rather than when the guard drops.
    pub async fn release(self) -> AppResult<()> {
        match self.held {
            Held::Memory(guard) => {
                drop(guard);
                Ok(())
            }
            Held::Postgres(tx) => tx.commit().await.map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to release owner lock", e)
            }),
        }
    }
}

impl std::fmt::Debug for OwnerGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match self.held {
            Held::Memory(_) => "memory",
            Held::Postgres(_) => "postgres",
        };
        f.debug_struct("OwnerGuard").field("backend", &backend).finish()
    }
}
