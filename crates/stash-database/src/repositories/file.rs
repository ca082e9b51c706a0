//! File repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;
use stash_core::types::{FileId, FolderId, OwnerId};
use stash_entity::file::{CreateFile, FileRecord};

use crate::traits::FileRepository;

/// Repository for file rows.
#[derive(Debug, Clone)]
pub struct PgFileRepository {
    pool: PgPool,
}

impl PgFileRepository {
    /// Create a new file repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PgFileRepository {
    async fn create(&self, data: &CreateFile) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "INSERT INTO files \
             (id, owner_id, folder_id, name, extension, size_bytes, physical_key, created_at, updated_at) \
             SELECT $1, $2, $3, $4, $5, $6, $7, $8, $8 \
             WHERE $3::uuid IS NULL \
                OR EXISTS (SELECT 1 FROM folders WHERE id = $3 AND owner_id = $2) \
             RETURNING *",
        )
        .bind(FileId::new())
        .bind(data.owner_id)
        .bind(data.folder_id)
        .bind(&data.name)
        .bind(&data.extension)
        .bind(data.size_bytes)
        .bind(&data.physical_key)
        .bind(data.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("files_physical_key_key") =>
            {
                AppError::conflict(format!("Physical key '{}' already in use", data.physical_key))
            }
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("files_folder_id_fkey") =>
            {
                AppError::not_found("Destination folder no longer exists")
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create file", e),
        })?
        .ok_or_else(|| AppError::not_found("Destination folder no longer exists"))
    }

    async fn find_by_id(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>("SELECT * FROM files WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find file", e))
    }

    async fn move_to_folder(
        &self,
        owner: OwnerId,
        id: FileId,
        folder: Option<FolderId>,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "UPDATE files SET folder_id = $3, updated_at = $4 \
             WHERE id = $1 AND owner_id = $2 \
             AND ($3::uuid IS NULL \
                  OR EXISTS (SELECT 1 FROM folders WHERE id = $3 AND owner_id = $2)) \
             RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .bind(folder)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to move file", e))?
        .ok_or_else(|| AppError::not_found(format!("File {id} or its destination not found")))
    }

    async fn soft_delete(
        &self,
        owner: OwnerId,
        id: FileId,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "UPDATE files SET deleted_at = COALESCE(deleted_at, $3), updated_at = $3 \
             WHERE id = $1 AND owner_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to trash file", e))?
        .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }

    async fn restore(
        &self,
        owner: OwnerId,
        id: FileId,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        sqlx::query_as::<_, FileRecord>(
            "UPDATE files SET deleted_at = NULL, updated_at = $3 \
             WHERE id = $1 AND owner_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .bind(at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to restore file", e))?
        .ok_or_else(|| AppError::not_found(format!("File {id} not found")))
    }

    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE owner_id = $1 AND deleted_at IS NOT NULL \
             ORDER BY deleted_at DESC, name ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list trashed files", e)
        })
    }

    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "SELECT * FROM files WHERE deleted_at IS NOT NULL AND deleted_at <= $1 \
             ORDER BY deleted_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list expired files", e)
        })
    }

    async fn delete_trashed(
        &self,
        owner: OwnerId,
        id: FileId,
        cutoff: Option<DateTime<Utc>>,
    ) -> AppResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "DELETE FROM files \
             WHERE id = $1 AND owner_id = $2 AND deleted_at IS NOT NULL \
             AND ($3::timestamptz IS NULL OR deleted_at <= $3) \
             RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .bind(cutoff)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to delete trashed file", e)
        })
    }

    async fn delete(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(
            "DELETE FROM files WHERE id = $1 AND owner_id = $2 RETURNING *",
        )
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete file", e))
    }

    async fn total_size(&self, owner: OwnerId) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(size_bytes), 0)::BIGINT FROM files WHERE owner_id = $1",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to sum file sizes", e))
    }
}
