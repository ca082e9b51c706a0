//! Folder entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stash_core::types::{FolderId, OwnerId};

/// A folder in an owner's tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FolderRecord {
    /// Unique folder identifier.
    pub id: FolderId,
    /// The folder owner.
    pub owner_id: OwnerId,
    /// Folder name.
    pub name: String,
    /// Parent folder (None for top-level folders).
    pub parent_id: Option<FolderId>,
    /// When the folder was created.
    pub created_at: DateTime<Utc>,
    /// When the folder was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the folder was moved to the trash.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FolderRecord {
    /// Whether the folder is in the trash.
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the folder was trashed at or before `cutoff`.
    pub fn trashed_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.deleted_at.is_some_and(|at| at <= cutoff)
    }
}

/// Data required to create a new folder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolder {
    /// The folder owner.
    pub owner_id: OwnerId,
    /// Parent folder.
    pub parent_id: Option<FolderId>,
    /// Folder name.
    pub name: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
