//! Storage account entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stash_core::types::OwnerId;

/// Per-owner storage quota ledger.
///
/// After every committed operation `0 <= used_bytes <= limit_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct StorageAccount {
    /// The owning account.
    pub owner_id: OwnerId,
    /// Maximum bytes the owner may hold, including in-flight uploads.
    pub limit_bytes: i64,
    /// Bytes currently accounted for.
    pub used_bytes: i64,
    /// When the account was opened.
    pub created_at: DateTime<Utc>,
    /// When the ledger last changed.
    pub updated_at: DateTime<Utc>,
}

impl StorageAccount {
    /// Bytes still available under the limit.
    pub fn available_bytes(&self) -> i64 {
        (self.limit_bytes - self.used_bytes).max(0)
    }

    /// Whether reserving `bytes` more would exceed the limit.
    pub fn would_exceed(&self, bytes: i64) -> bool {
        self.used_bytes.saturating_add(bytes) > self.limit_bytes
    }

    /// Usage as a percentage of the limit.
    pub fn usage_percent(&self) -> f64 {
        if self.limit_bytes == 0 {
            return 0.0;
        }
        (self.used_bytes as f64 / self.limit_bytes as f64) * 100.0
    }
}
