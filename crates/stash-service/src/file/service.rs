//! Single-shot uploads, reads, and direct removal of stored files.

use std::sync::Arc;

use tracing::{info, warn};

use stash_core::config::StorageConfig;
use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::traits::{ByteStream, Clock, StorageProvider};
use stash_core::types::{FileId, FolderId, OwnerId};
use stash_database::{FileRepository, FolderRepository, OwnerLockManager};
use stash_entity::file::{CreateFile, FileRecord};
use stash_storage::layout;

use crate::quota::QuotaService;

/// Parameters of a single-shot upload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UploadFileRequest {
    /// The uploading account.
    pub owner_id: OwnerId,
    /// Destination folder (None = root).
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// Extension without the leading dot.
    pub extension: String,
    /// Declared size in bytes; the body must match it exactly.
    pub size_bytes: i64,
}

/// A live file opened for reading.
pub struct OpenedFile {
    /// The file's metadata.
    pub file: FileRecord,
    /// The stored bytes.
    pub body: ByteStream,
}

impl std::fmt::Debug for OpenedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenedFile")
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Stores, opens, and removes whole files outside the chunked path.
#[derive(Debug, Clone)]
pub struct FileService {
    files: Arc<dyn FileRepository>,
    folders: Arc<dyn FolderRepository>,
    quota: Arc<QuotaService>,
    provider: Arc<dyn StorageProvider>,
    locks: Arc<dyn OwnerLockManager>,
    clock: Arc<dyn Clock>,
    config: StorageConfig,
}

impl FileService {
    /// Create a new file service.
    pub fn new(
        files: Arc<dyn FileRepository>,
        folders: Arc<dyn FolderRepository>,
        quota: Arc<QuotaService>,
        provider: Arc<dyn StorageProvider>,
        locks: Arc<dyn OwnerLockManager>,
        clock: Arc<dyn Clock>,
        config: StorageConfig,
    ) -> Self {
        Self {
            files,
            folders,
            quota,
            provider,
            locks,
            clock,
            config,
        }
    }

    fn validate(&self, req: &UploadFileRequest) -> AppResult<()> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("File name must not be empty"));
        }
        if req.size_bytes < 0 {
            return Err(AppError::validation("File size must not be negative"));
        }
        if req.size_bytes > self.config.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "Upload exceeds maximum size of {} bytes",
                self.config.max_upload_size_bytes
            )));
        }
        Ok(())
    }

    /// Reserve the declared size, store the body, and record the file.
    ///
    /// Any failure after the reservation removes the written blob and
    /// returns the reservation.
    pub async fn upload_file(
        &self,
        req: UploadFileRequest,
        body: ByteStream,
    ) -> AppResult<FileRecord> {
        self.validate(&req)?;

        if let Some(folder_id) = req.folder_id {
            self.folders
                .find_by_id(req.owner_id, folder_id)
                .await?
                .filter(|f| !f.is_trashed())
                .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;
        }

        self.quota.reserve(req.owner_id, req.size_bytes).await?;

        let key = layout::new_object_key();
        match self.store(&req, &key, body).await {
            Ok(file) => {
                info!(
                    owner_id = %file.owner_id,
                    file_id = %file.id,
                    size_bytes = file.size_bytes,
                    "File stored"
                );
                Ok(file)
            }
            Err(e) => {
                if let Err(cleanup) = self.provider.delete(&key).await {
                    warn!(key = %key, error = %cleanup, "Failed to remove stored object");
                }
                if let Err(release) = self.quota.release(req.owner_id, req.size_bytes).await {
                    warn!(
                        owner_id = %req.owner_id,
                        bytes = req.size_bytes,
                        error = %release,
                        "Failed to release reservation"
                    );
                }
                Err(e)
            }
        }
    }

    async fn store(
        &self,
        req: &UploadFileRequest,
        key: &str,
        body: ByteStream,
    ) -> AppResult<FileRecord> {
        let written = self.provider.write_stream(key, body).await? as i64;
        if written != req.size_bytes {
            return Err(AppError::integrity(format!(
                "Received {written} bytes, declared {}",
                req.size_bytes
            )));
        }

        self.files
            .create(&CreateFile {
                owner_id: req.owner_id,
                folder_id: req.folder_id,
                name: req.name.clone(),
                extension: req.extension.clone(),
                size_bytes: written,
                physical_key: key.to_string(),
                created_at: self.clock.now(),
            })
            .await
    }

    /// Open a live file. Trashed files are `NotFound`; a live row whose blob
    /// is gone is `Integrity`.
    pub async fn open_file(&self, owner: OwnerId, id: FileId) -> AppResult<OpenedFile> {
        let file = self
            .files
            .find_by_id(owner, id)
            .await?
            .filter(|f| !f.is_trashed())
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;

        let body = match self.provider.read(&file.physical_key).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                return Err(AppError::integrity(format!(
                    "Content of file {id} is missing from storage"
                )));
            }
            Err(e) => return Err(e),
        };
        Ok(OpenedFile { file, body })
    }

    /// Remove a file, live or trashed, without going through the trash.
    ///
    /// The blob goes first; if it cannot be removed the row stays.
    pub async fn delete_file(&self, owner: OwnerId, id: FileId) -> AppResult<FileRecord> {
        let _guard = self.locks.lock_owner(owner).await?;
        let file = self
            .files
            .find_by_id(owner, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;

        self.provider.delete(&file.physical_key).await?;

        let removed = self
            .files
            .delete(owner, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("File {id} not found")))?;
        self.quota.release(owner, removed.size_bytes).await?;

        info!(
            owner_id = %owner,
            file_id = %id,
            freed_bytes = removed.size_bytes,
            "File deleted"
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures::TryStreamExt;

    use stash_core::error::ErrorKind;
    use stash_entity::folder::CreateFolder;

    use super::*;
    use crate::testing::{Harness, body};

    fn request(h: &Harness, size_bytes: i64) -> UploadFileRequest {
        UploadFileRequest {
            owner_id: h.owner,
            folder_id: None,
            name: "notes".into(),
            extension: "txt".into(),
            size_bytes,
        }
    }

    async fn read_all(opened: OpenedFile) -> Vec<u8> {
        let chunks: Vec<Bytes> = opened.body.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_upload_then_open() {
        let h = Harness::new(100).await;
        let file = h
            .files
            .upload_file(request(&h, 5), body(b"hello".to_vec()))
            .await
            .unwrap();
        assert_eq!(file.display_name(), "notes.txt");
        assert_eq!(h.used().await, 5);

        let opened = h.files.open_file(h.owner, file.id).await.unwrap();
        assert_eq!(opened.file.id, file.id);
        assert_eq!(read_all(opened).await, b"hello");
    }

    #[tokio::test]
    async fn test_upload_over_quota_writes_nothing() {
        let h = Harness::new(4).await;
        let err = h
            .files
            .upload_file(request(&h, 5), body(b"hello".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(h.used().await, 0);
        assert!(h.provider.list("objects").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_size_mismatch_and_write_failure_compensate() {
        let h = Harness::new(100).await;
        let err = h
            .files
            .upload_file(request(&h, 10), body(b"short".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);
        assert_eq!(h.used().await, 0);
        assert!(h.provider.list("objects").await.unwrap().is_empty());

        h.storage.fail_writes_under("objects/");
        let err = h
            .files
            .upload_file(request(&h, 5), body(b"hello".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_upload_into_trashed_folder_is_refused() {
        let h = Harness::new(100).await;
        let folder = h
            .repos
            .folders
            .create(&CreateFolder {
                owner_id: h.owner,
                parent_id: None,
                name: "docs".into(),
                created_at: h.clock.now(),
            })
            .await
            .unwrap();
        h.trash.soft_delete_folder(h.owner, folder.id).await.unwrap();

        let mut req = request(&h, 1);
        req.folder_id = Some(folder.id);
        let err = h.files.upload_file(req, body(vec![0])).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        assert_eq!(h.used().await, 0);
    }

    #[tokio::test]
    async fn test_open_rejects_trashed_and_reports_missing_blob() {
        let h = Harness::new(100).await;
        let file = h
            .files
            .upload_file(request(&h, 3), body(b"abc".to_vec()))
            .await
            .unwrap();

        h.trash.soft_delete_file(h.owner, file.id).await.unwrap();
        let err = h.files.open_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        h.trash.restore_file(h.owner, file.id).await.unwrap();
        h.provider.delete(&file.physical_key).await.unwrap();
        let err = h.files.open_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Integrity);

        let err = h.files.open_file(OwnerId::new(), file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_file_releases_quota() {
        let h = Harness::new(100).await;
        let file = h
            .files
            .upload_file(request(&h, 7), body(vec![1; 7]))
            .await
            .unwrap();

        h.storage.fail_delete(&file.physical_key);
        let err = h.files.delete_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Storage);
        assert!(h.repos.files.find_by_id(h.owner, file.id).await.unwrap().is_some());
        assert_eq!(h.used().await, 7);

        h.storage.heal();
        let removed = h.files.delete_file(h.owner, file.id).await.unwrap();
        assert_eq!(removed.size_bytes, 7);
        assert!(!h.provider.exists(&file.physical_key).await.unwrap());
        assert_eq!(h.used().await, 0);

        let err = h.files.delete_file(h.owner, file.id).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }
}
