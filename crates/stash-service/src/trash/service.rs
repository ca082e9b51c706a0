//! Trash service: soft delete, restore, listing, and permanent removal.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::traits::{Clock, StorageProvider};
use stash_core::types::{FileId, FolderId, OwnerId};
use stash_database::{FileRepository, FolderRepository, OwnerLockManager};
use stash_entity::file::FileRecord;
use stash_entity::folder::{CascadeSummary, FolderRecord, TreeDeletion};

use crate::quota::QuotaService;

/// Outcome of permanently deleting a folder subtree.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FolderPurge {
    /// Folders removed, root included.
    pub folders: usize,
    /// Blob keys of the removed files.
    pub physical_keys: Vec<String>,
    /// Bytes returned to the owner's quota.
    pub freed_bytes: i64,
}

/// Moves files and folders in and out of the trash.
///
/// Every mutation for an owner runs under that owner's lock. The lock is
/// held by the metadata store, so it also excludes purges and restores
/// running in other processes.
#[derive(Debug, Clone)]
pub struct TrashService {
    files: Arc<dyn FileRepository>,
    folders: Arc<dyn FolderRepository>,
    quota: Arc<QuotaService>,
    provider: Arc<dyn StorageProvider>,
    clock: Arc<dyn Clock>,
    locks: Arc<dyn OwnerLockManager>,
}

impl TrashService {
    /// Create a new trash service.
    pub fn new(
        files: Arc<dyn FileRepository>,
        folders: Arc<dyn FolderRepository>,
        quota: Arc<QuotaService>,
        provider: Arc<dyn StorageProvider>,
        locks: Arc<dyn OwnerLockManager>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            files,
            folders,
            quota,
            provider,
            clock,
            locks,
        }
    }

    async fn file(&self, owner: OwnerId, id: FileId) -> AppResult<FileRecord> {
        self.files
            .find_by_id(owner, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }

    async fn folder(&self, owner: OwnerId, id: FolderId) -> AppResult<FolderRecord> {
        self.folders
            .find_by_id(owner, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {id} not found")))
    }

    /// Move a file to the trash.
    pub async fn soft_delete_file(&self, owner: OwnerId, id: FileId) -> AppResult<FileRecord> {
        let _guard = self.locks.lock_owner(owner).await?;
        let file = self.files.soft_delete(owner, id, self.clock.now()).await?;
        info!(owner_id = %owner, file_id = %id, "File moved to trash");
        Ok(file)
    }

    /// Take a file out of the trash.
    ///
    /// A file whose folder is trashed or gone is restored to the root.
    pub async fn restore_file(&self, owner: OwnerId, id: FileId) -> AppResult<FileRecord> {
        let _guard = self.locks.lock_owner(owner).await?;
        let file = self.file(owner, id).await?;
        if !file.is_trashed() {
            return Ok(file);
        }

        if let Some(folder_id) = file.folder_id {
            let parent_live = self
                .folders
                .find_by_id(owner, folder_id)
                .await?
                .is_some_and(|f| !f.is_trashed());
            if !parent_live {
                self.files
                    .move_to_folder(owner, id, None, self.clock.now())
                    .await?;
            }
        }

        let file = self.files.restore(owner, id, self.clock.now()).await?;
        info!(owner_id = %owner, file_id = %id, "File restored from trash");
        Ok(file)
    }

    /// Trash a folder, every folder below it, and every file inside them.
    pub async fn soft_delete_folder(
        &self,
        owner: OwnerId,
        id: FolderId,
    ) -> AppResult<CascadeSummary> {
        let _guard = self.locks.lock_owner(owner).await?;
        let summary = self
            .folders
            .soft_delete_cascade(owner, id, self.clock.now())
            .await?;
        info!(
            owner_id = %owner,
            folder_id = %id,
            folders = summary.folders,
            files = summary.files,
            "Folder moved to trash"
        );
        Ok(summary)
    }

    /// Restore a folder subtree.
    pub async fn restore_folder(&self, owner: OwnerId, id: FolderId) -> AppResult<CascadeSummary> {
        let _guard = self.locks.lock_owner(owner).await?;
        let summary = self
            .folders
            .restore_cascade(owner, id, self.clock.now())
            .await?;
        info!(
            owner_id = %owner,
            folder_id = %id,
            folders = summary.folders,
            files = summary.files,
            "Folder restored from trash"
        );
        Ok(summary)
    }

    /// Trashed files, most recently trashed first.
    pub async fn list_trashed_files(&self, owner: OwnerId) -> AppResult<Vec<FileRecord>> {
        self.files.list_trashed(owner).await
    }

    /// Trashed folders, most recently trashed first.
    pub async fn list_trashed_folders(&self, owner: OwnerId) -> AppResult<Vec<FolderRecord>> {
        self.folders.list_trashed(owner).await
    }

    /// Remove a trashed file's blob and then its row.
    ///
    /// If the blob cannot be removed the row stays and the error returns.
    pub async fn permanent_delete_file(&self, owner: OwnerId, id: FileId) -> AppResult<FileRecord> {
        let _guard = self.locks.lock_owner(owner).await?;
        let file = self.file(owner, id).await?;
        if !file.is_trashed() {
            return Err(AppError::not_found(format!("File {id} is not in the trash")));
        }

        self.provider.delete(&file.physical_key).await?;

        let removed = self
            .files
            .delete_trashed(owner, id, None)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} is not in the trash")))?;
        self.quota.release(owner, removed.size_bytes).await?;

        info!(
            owner_id = %owner,
            file_id = %id,
            freed_bytes = removed.size_bytes,
            "File permanently deleted"
        );
        Ok(removed)
    }

    /// Remove a trashed folder subtree with all its files.
    ///
    /// Every blob of the subtree is removed before any row; a failed blob
    /// removal leaves all rows in place.
    pub async fn permanent_delete_folder(
        &self,
        owner: OwnerId,
        id: FolderId,
    ) -> AppResult<FolderPurge> {
        let _guard = self.locks.lock_owner(owner).await?;
        let folder = self.folder(owner, id).await?;
        if !folder.is_trashed() {
            return Err(AppError::not_found(format!(
                "Folder {id} is not in the trash"
            )));
        }

        let snapshot = self.folders.files_in_tree(owner, id).await?;
        for file in &snapshot {
            self.provider.delete(&file.physical_key).await?;
        }

        let deleted = self
            .folders
            .delete_tree(owner, id, TreeDeletion::Trashed)
            .await?;

        let unlinked: HashSet<&str> = snapshot.iter().map(|f| f.physical_key.as_str()).collect();
        for file in deleted.files.iter().filter(|f| !unlinked.contains(f.physical_key.as_str())) {
            if let Err(e) = self.provider.delete(&file.physical_key).await {
                warn!(
                    owner_id = %owner,
                    key = %file.physical_key,
                    error = %e,
                    "Failed to remove blob of late file"
                );
            }
        }

        let freed_bytes = deleted.freed_bytes();
        self.quota.release(owner, freed_bytes).await?;

        info!(
            owner_id = %owner,
            folder_id = %id,
            folders = deleted.folder_ids.len(),
            files = deleted.files.len(),
            freed_bytes,
            "Folder permanently deleted"
        );
        Ok(FolderPurge {
            folders: deleted.folder_ids.len(),
            physical_keys: deleted.physical_keys(),
            freed_bytes,
        })
    }

    /// Trashed files of all owners whose trash time is at or before `cutoff`.
    pub async fn expired_files(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileRecord>> {
        self.files.list_trashed_before(cutoff).await
    }

    /// Trashed folders of all owners whose trash time is at or before `cutoff`.
    pub async fn expired_folders(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FolderRecord>> {
        self.folders.list_trashed_before(cutoff).await
    }

    /// Purge one expired file. Returns `false` if it was restored, removed,
    /// or re-trashed after `cutoff` since it was listed.
    pub async fn purge_expired_file(
        &self,
        file: &FileRecord,
        cutoff: DateTime<Utc>,
    ) -> AppResult<bool> {
        let owner = file.owner_id;
        let _guard = self.locks.lock_owner(owner).await?;

        let Some(current) = self.files.find_by_id(owner, file.id).await? else {
            return Ok(false);
        };
        if !current.trashed_before(cutoff) {
            return Ok(false);
        }

        self.provider.delete(&current.physical_key).await?;

        let Some(removed) = self.files.delete_trashed(owner, file.id, Some(cutoff)).await? else {
            return Ok(false);
        };
        self.quota.release(owner, removed.size_bytes).await?;
        Ok(true)
    }

    /// Purge one expired, empty folder subtree. Returns `false` if the
    /// folder is gone or no longer expired; `Conflict` if files or live
    /// folders remain below it.
    pub async fn purge_expired_folder(
        &self,
        folder: &FolderRecord,
        cutoff: DateTime<Utc>,
    ) -> AppResult<bool> {
        let owner = folder.owner_id;
        let _guard = self.locks.lock_owner(owner).await?;

        match self
            .folders
            .delete_tree(owner, folder.id, TreeDeletion::ExpiredAndEmpty { cutoff })
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use stash_core::error::ErrorKind;
    use stash_entity::file::CreateFile;
    use stash_entity::folder::CreateFolder;

    use super::*;
    use crate::testing::{Harness, body};
    use crate::upload::InitUploadRequest;

    async fn folder(h: &Harness, parent: Option<FolderId>, name: &str) -> FolderRecord {
        h.repos
            .folders
            .create(&CreateFolder {
                owner_id: h.owner,
                parent_id: parent,
                name: name.into(),
                created_at: h.clock.now(),
            })
            .await
            .unwrap()
    }

    /// Upload a file through the upload service so quota and blob are real.
    async fn upload(h: &Harness, folder: Option<FolderId>, name: &str, size: usize) -> FileRecord {
        let session = h
            .uploads
            .init_session(InitUploadRequest {
                owner_id: h.owner,
                folder_id: folder,
                name: name.into(),
                extension: "txt".into(),
                total_size: size as i64,
                total_parts: 1,
            })
            .await
            .unwrap();
        h.uploads.upload_part(session.id, 1, body(vec![b'x'; size])).await.unwrap();
        h.uploads.complete(session.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_cascade_marks_subtree_with_one_timestamp() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        let b = folder(&h, Some(a.id), "B").await;
        let f = upload(&h, Some(b.id), "F", 10).await;

        let summary = h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();
        assert_eq!(summary, CascadeSummary { folders: 2, files: 1 });

        let folders = h.trash.list_trashed_folders(h.owner).await.unwrap();
        let files = h.trash.list_trashed_files(h.owner).await.unwrap();
        let ids: HashSet<FolderId> = folders.iter().map(|f| f.id).collect();
        assert_eq!(ids, HashSet::from([a.id, b.id]));
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, f.id);

        let stamp = h.clock.now();
        assert!(folders.iter().all(|f| f.deleted_at == Some(stamp)));
        assert_eq!(files[0].deleted_at, Some(stamp));

        h.trash.restore_folder(h.owner, a.id).await.unwrap();
        assert!(h.trash.list_trashed_folders(h.owner).await.unwrap().is_empty());
        assert!(h.trash.list_trashed_files(h.owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cascade_leaves_other_trees_alone() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        let other = folder(&h, None, "Other").await;
        let kept = upload(&h, Some(other.id), "kept", 5).await;
        let old = upload(&h, None, "old", 5).await;

        h.trash.soft_delete_file(h.owner, old.id).await.unwrap();
        h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();
        h.trash.restore_folder(h.owner, a.id).await.unwrap();

        let trashed = h.trash.list_trashed_files(h.owner).await.unwrap();
        assert_eq!(trashed.len(), 1);
        assert_eq!(trashed[0].id, old.id);
        let kept = h.repos.files.find_by_id(h.owner, kept.id).await.unwrap().unwrap();
        assert!(!kept.is_trashed());
    }

    #[tokio::test]
    async fn test_trash_listing_order() {
        let h = Harness::new(10_000).await;
        let first = upload(&h, None, "b-first", 1).await;
        let second = upload(&h, None, "a-second", 1).await;
        let third = upload(&h, None, "c-third", 1).await;

        h.trash.soft_delete_file(h.owner, first.id).await.unwrap();
        h.clock.advance(Duration::minutes(1));
        h.trash.soft_delete_file(h.owner, second.id).await.unwrap();
        h.trash.soft_delete_file(h.owner, third.id).await.unwrap();

        let names: Vec<String> = h
            .trash
            .list_trashed_files(h.owner)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a-second", "c-third", "b-first"]);
    }

    #[tokio::test]
    async fn test_soft_delete_keeps_first_timestamp_and_restore_is_noop_on_live() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 3).await;

        let first = h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        h.clock.advance(Duration::days(1));
        let again = h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        assert_eq!(first.deleted_at, again.deleted_at);

        let restored = h.trash.restore_file(h.owner, file.id).await.unwrap();
        assert!(!restored.is_trashed());
        let still = h.trash.restore_file(h.owner, file.id).await.unwrap();
        assert!(!still.is_trashed());

        let err = h.trash.soft_delete_file(OwnerId::new(), file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_restore_file_from_trashed_folder_goes_to_root() {
        let h = Harness::new(10_000).await;
        let dir = folder(&h, None, "dir").await;
        let file = upload(&h, Some(dir.id), "f", 3).await;
        h.trash.soft_delete_folder(h.owner, dir.id).await.unwrap();
        h.clock.advance(Duration::hours(2));

        let restored = h.trash.restore_file(h.owner, file.id).await.unwrap();
        assert!(!restored.is_trashed());
        assert_eq!(restored.folder_id, None);
        assert_eq!(restored.updated_at, h.clock.now());
    }

    #[tokio::test]
    async fn test_permanent_delete_file() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 40).await;
        assert_eq!(h.used().await, 40);

        let err = h.trash.permanent_delete_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        h.trash.permanent_delete_file(h.owner, file.id).await.unwrap();
        assert!(!h.provider.exists(&file.physical_key).await.unwrap());
        assert!(h.repos.files.find_by_id(h.owner, file.id).await.unwrap().is_none());
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_permanent_delete_file_with_absent_blob_succeeds() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 4).await;
        h.provider.delete(&file.physical_key).await.unwrap();
        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();

        h.trash.permanent_delete_file(h.owner, file.id).await.unwrap();
        assert!(h.repos.files.find_by_id(h.owner, file.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_blob_removal_keeps_file_row() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 4).await;
        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        h.storage.fail_delete(&file.physical_key);

        let err = h.trash.permanent_delete_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert!(h.repos.files.find_by_id(h.owner, file.id).await.unwrap().is_some());
        assert_eq!(h.used().await, 4);
    }

    #[tokio::test]
    async fn test_permanent_delete_folder_returns_keys() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        let b = folder(&h, Some(a.id), "B").await;
        let f1 = upload(&h, Some(a.id), "f1", 10).await;
        let f2 = upload(&h, Some(b.id), "f2", 20).await;

        let err = h.trash.permanent_delete_folder(h.owner, a.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();
        let purge = h.trash.permanent_delete_folder(h.owner, a.id).await.unwrap();
        assert_eq!(purge.folders, 2);
        assert_eq!(purge.freed_bytes, 30);
        let keys: HashSet<String> = purge.physical_keys.into_iter().collect();
        assert_eq!(keys, HashSet::from([f1.physical_key.clone(), f2.physical_key.clone()]));

        assert!(!h.provider.exists(&f1.physical_key).await.unwrap());
        assert!(h.repos.folders.find_by_id(h.owner, b.id).await.unwrap().is_none());
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_permanent_delete_folder_blob_failure_keeps_rows() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        let f1 = upload(&h, Some(a.id), "f1", 10).await;
        let f2 = upload(&h, Some(a.id), "f2", 10).await;
        h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();
        h.storage.fail_delete(&f2.physical_key);

        let err = h.trash.permanent_delete_folder(h.owner, a.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert!(h.repos.files.find_by_id(h.owner, f1.id).await.unwrap().is_some());
        assert!(h.repos.files.find_by_id(h.owner, f2.id).await.unwrap().is_some());
        assert!(h.repos.folders.find_by_id(h.owner, a.id).await.unwrap().is_some());

        h.storage.heal();
        let purge = h.trash.permanent_delete_folder(h.owner, a.id).await.unwrap();
        assert_eq!(purge.physical_keys.len(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired_file_skips_restored() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 4).await;
        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        let listed = h.repos.files.find_by_id(h.owner, file.id).await.unwrap().unwrap();

        h.trash.restore_file(h.owner, file.id).await.unwrap();
        let cutoff = h.clock.now() + Duration::days(1);
        assert!(!h.trash.purge_expired_file(&listed, cutoff).await.unwrap());
        assert!(h.provider.exists(&file.physical_key).await.unwrap());
    }

    #[tokio::test]
    async fn test_restore_on_another_node_waits_for_purge() {
        let h = Harness::new(10_000).await;
        let file = upload(&h, None, "f", 4).await;
        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        let listed = h.repos.files.find_by_id(h.owner, file.id).await.unwrap().unwrap();
        let cutoff = h.clock.now();

        let hold = h.storage.hold(&file.physical_key);
        let purge = {
            let trash = h.trash.clone();
            tokio::spawn(async move { trash.purge_expired_file(&listed, cutoff).await })
        };
        hold.reached().await;

        let restore = {
            let other = h.trash_service();
            let (owner, id) = (h.owner, file.id);
            tokio::spawn(async move { other.restore_file(owner, id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!restore.is_finished());

        hold.resume();
        assert!(purge.await.unwrap().unwrap());
        let err = restore.await.unwrap().unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert!(h.repos.files.find_by_id(h.owner, file.id).await.unwrap().is_none());
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_folder_restore_on_another_node_waits_for_permanent_delete() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        let f = upload(&h, Some(a.id), "f", 6).await;
        h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();

        let hold = h.storage.hold(&f.physical_key);
        let delete = {
            let trash = h.trash.clone();
            let (owner, id) = (h.owner, a.id);
            tokio::spawn(async move { trash.permanent_delete_folder(owner, id).await })
        };
        hold.reached().await;

        let restore = {
            let other = h.trash_service();
            let (owner, id) = (h.owner, f.id);
            tokio::spawn(async move { other.restore_file(owner, id).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!restore.is_finished());

        hold.resume();
        assert_eq!(delete.await.unwrap().unwrap().freed_bytes, 6);
        assert!(restore.await.unwrap().unwrap_err().is_not_found());
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired_folder_requires_empty_subtree() {
        let h = Harness::new(10_000).await;
        let a = folder(&h, None, "A").await;
        h.repos
            .files
            .create(&CreateFile {
                owner_id: h.owner,
                folder_id: Some(a.id),
                name: "stuck".into(),
                extension: String::new(),
                size_bytes: 0,
                physical_key: "objects/stuck".into(),
                created_at: h.clock.now(),
            })
            .await
            .unwrap();
        h.trash.soft_delete_folder(h.owner, a.id).await.unwrap();
        let listed = h.repos.folders.find_by_id(h.owner, a.id).await.unwrap().unwrap();

        let cutoff = h.clock.now();
        let err = h.trash.purge_expired_folder(&listed, cutoff).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let early = cutoff - Duration::seconds(1);
        assert!(!h.trash.purge_expired_folder(&listed, early).await.unwrap());
    }
}
