//! File entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stash_core::types::{FileId, FolderId, OwnerId};

/// A stored file. `deleted_at` set means the file is in the trash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    /// Unique file identifier.
    pub id: FileId,
    /// The file owner.
    pub owner_id: OwnerId,
    /// Containing folder (None = root).
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// Extension without the leading dot (may be empty).
    pub extension: String,
    /// Persisted size in bytes.
    pub size_bytes: i64,
    /// Key of the blob in the storage provider.
    pub physical_key: String,
    /// When the file was created.
    pub created_at: DateTime<Utc>,
    /// When the file was last updated.
    pub updated_at: DateTime<Utc>,
    /// When the file was moved to the trash.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    /// Whether the file is in the trash.
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether the file was trashed at or before `cutoff`.
    pub fn trashed_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.deleted_at.is_some_and(|at| at <= cutoff)
    }

    /// Name with extension, as shown to users.
    pub fn display_name(&self) -> String {
        if self.extension.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.name, self.extension)
        }
    }
}

/// Data required to create a new file record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFile {
    /// The file owner.
    pub owner_id: OwnerId,
    /// Containing folder.
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// Extension.
    pub extension: String,
    /// Persisted size in bytes.
    pub size_bytes: i64,
    /// Blob key.
    pub physical_key: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
