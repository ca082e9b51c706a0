//! Results and policies of whole-subtree operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stash_core::types::FolderId;

use crate::file::FileRecord;

/// Rows touched by a cascade soft-delete or restore.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadeSummary {
    /// Folders in the closure (root included).
    pub folders: u64,
    /// Files whose folder lies in the closure.
    pub files: u64,
}

/// When a subtree may be hard-deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeDeletion {
    /// The root must be trashed; everything under it is removed.
    Trashed,
    /// The root must have been trashed at or before `cutoff`, and the
    /// subtree must hold no file rows and no live folders.
    ExpiredAndEmpty {
        /// Latest trash time still eligible.
        cutoff: DateTime<Utc>,
    },
}

/// Rows removed by a subtree hard delete.
#[derive(Debug, Clone, Default)]
pub struct DeletedTree {
    /// Removed folders (root included).
    pub folder_ids: Vec<FolderId>,
    /// Removed file rows.
    pub files: Vec<FileRecord>,
}

impl DeletedTree {
    /// Blob keys of the removed files.
    pub fn physical_keys(&self) -> Vec<String> {
        self.files.iter().map(|f| f.physical_key.clone()).collect()
    }

    /// Total size of the removed files.
    pub fn freed_bytes(&self) -> i64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}
