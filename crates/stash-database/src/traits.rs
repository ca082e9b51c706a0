//! Metadata store capabilities consumed by the services.
//!
//! Each trait has a PostgreSQL implementation in [`crate::repositories`]
//! and an in-process implementation in [`crate::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stash_core::result::AppResult;
use stash_core::types::{FileId, FolderId, OwnerId, SessionId};
use stash_entity::account::StorageAccount;
use stash_entity::file::{CreateFile, FileRecord};
use stash_entity::folder::{CascadeSummary, CreateFolder, DeletedTree, FolderRecord, TreeDeletion};
use stash_entity::upload::{ClaimedSession, CreateUploadSession, UploadPart, UploadSession};

use crate::locks::OwnerGuard;

/// Owner-wide mutual exclusion shared by every process using the store.
///
/// Trash mutations and purges of one owner take this lock so that a blob is
/// never removed while another process restores its row.
#[async_trait]
pub trait OwnerLockManager: Send + Sync + std::fmt::Debug + 'static {
    /// Wait until the owner's lock is held.
    async fn lock_owner(&self, owner: OwnerId) -> AppResult<OwnerGuard>;
}

/// Per-owner storage ledger.
///
/// Every mutation locks the account for the whole read-check-write so
/// concurrent reservations can never oversubscribe the limit. Byte counts
/// are validated by the caller.
#[async_trait]
pub trait QuotaLedger: Send + Sync + std::fmt::Debug + 'static {
    /// Create an account with zero usage. `Conflict` if it already exists.
    async fn open_account(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount>;

    /// Fetch an account.
    async fn find_account(&self, owner: OwnerId) -> AppResult<Option<StorageAccount>>;

    /// Add `bytes` to usage. `QuotaExceeded` if `used + bytes > limit`.
    async fn reserve(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount>;

    /// Subtract `bytes` from usage, clamping at zero.
    async fn release(&self, owner: OwnerId, bytes: i64) -> AppResult<StorageAccount>;

    /// Overwrite usage. `Validation` unless `0 <= used_bytes <= limit`.
    async fn set_used(&self, owner: OwnerId, used_bytes: i64) -> AppResult<StorageAccount>;

    /// Change the limit. `Conflict` if current usage is above it.
    async fn set_limit(&self, owner: OwnerId, limit_bytes: i64) -> AppResult<StorageAccount>;
}

/// Upload session and part metadata.
#[async_trait]
pub trait UploadSessionRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a session in the `Initiated` state.
    async fn create(&self, data: &CreateUploadSession) -> AppResult<UploadSession>;

    /// Fetch a session.
    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UploadSession>>;

    /// Recorded parts, ordered by part number.
    async fn list_parts(&self, id: SessionId) -> AppResult<Vec<UploadPart>>;

    /// Record (or overwrite) a part's size and move the session to
    /// `Uploading`. `NotFound` if the session no longer exists.
    async fn upsert_part(
        &self,
        id: SessionId,
        part_number: i32,
        size_bytes: i64,
        at: DateTime<Utc>,
    ) -> AppResult<UploadPart>;

    /// Atomically remove a session and its parts, returning them.
    ///
    /// Exactly one concurrent caller receives `Some`.
    async fn take(&self, id: SessionId) -> AppResult<Option<ClaimedSession>>;

    /// Remove a session and its parts without returning them.
    async fn delete(&self, id: SessionId) -> AppResult<bool>;

    /// Sessions created at or before `cutoff`, oldest first.
    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadSession>>;

    /// All sessions of an owner, newest first.
    async fn list_by_owner(&self, owner: OwnerId) -> AppResult<Vec<UploadSession>>;
}

/// File metadata.
#[async_trait]
pub trait FileRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a live file. `NotFound` if the folder is not the owner's.
    async fn create(&self, data: &CreateFile) -> AppResult<FileRecord>;

    /// Fetch a file of an owner, live or trashed.
    async fn find_by_id(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>>;

    /// Point a file at another folder (None = root), scoped by id and owner.
    /// `NotFound` when no row matched or the folder is not the owner's.
    async fn move_to_folder(
        &self,
        owner: OwnerId,
        id: FileId,
        folder: Option<FolderId>,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord>;

    /// Mark a file trashed at `at`. An already trashed file keeps its
    /// original timestamp. `NotFound` when no row matched.
    async fn soft_delete(&self, owner: OwnerId, id: FileId, at: DateTime<Utc>)
    -> AppResult<FileRecord>;

    /// Clear the trash marker. `NotFound` when no row matched.
    async fn restore(&self, owner: OwnerId, id: FileId, at: DateTime<Utc>)
    -> AppResult<FileRecord>;

    /// Trashed files of an owner, most recently trashed first.
    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FileRecord>>;

    /// Trashed files of all owners trashed at or before `cutoff`.
    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileRecord>>;

    /// Hard-delete a file only if it is trashed (and, with `cutoff`, was
    /// trashed at or before it). Returns the removed row.
    async fn delete_trashed(
        &self,
        owner: OwnerId,
        id: FileId,
        cutoff: Option<DateTime<Utc>>,
    ) -> AppResult<Option<FileRecord>>;

    /// Hard-delete a file whether live or trashed. Returns the removed row.
    async fn delete(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>>;

    /// Sum of sizes of all file rows of an owner, live and trashed.
    async fn total_size(&self, owner: OwnerId) -> AppResult<i64>;
}

/// Folder metadata and subtree operations.
///
/// Subtree operations compute the owner-scoped descendant closure and apply
/// their changes to folders and files in one atomic scope.
#[async_trait]
pub trait FolderRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Insert a live folder. `NotFound` if the parent is not the owner's.
    async fn create(&self, data: &CreateFolder) -> AppResult<FolderRecord>;

    /// Fetch a folder of an owner, live or trashed.
    async fn find_by_id(&self, owner: OwnerId, id: FolderId) -> AppResult<Option<FolderRecord>>;

    /// Ids of `root` and all its descendants. Empty if `root` is absent.
    async fn descendant_closure(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FolderId>>;

    /// Trash every folder in the closure and every file inside it.
    /// Already trashed rows keep their timestamp. `NotFound` if `root` is absent.
    async fn soft_delete_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary>;

    /// Clear the trash marker on every folder in the closure and every file
    /// inside it. A root whose parent is trashed or gone is moved to the top
    /// level. `NotFound` if `root` is absent.
    async fn restore_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary>;

    /// Trashed folders of an owner, most recently trashed first.
    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FolderRecord>>;

    /// Trashed folders of all owners trashed at or before `cutoff`.
    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FolderRecord>>;

    /// File rows whose folder lies in the closure of `root`.
    async fn files_in_tree(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FileRecord>>;

    /// Hard-delete the closure of `root` and all files inside it in one
    /// transaction. `NotFound` if `root` is absent or not trashed (or not
    /// expired under `ExpiredAndEmpty`); `Conflict` if `ExpiredAndEmpty`
    /// finds files or live folders in the subtree.
    async fn delete_tree(
        &self,
        owner: OwnerId,
        root: FolderId,
        policy: TreeDeletion,
    ) -> AppResult<DeletedTree>;
}
