//! Upload session and part repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;
use stash_core::types::{OwnerId, SessionId};
use stash_entity::upload::{ClaimedSession, CreateUploadSession, UploadPart, UploadSession};

use crate::traits::UploadSessionRepository;

/// Repository for `upload_sessions` and `upload_parts`.
#[derive(Debug, Clone)]
pub struct PgUploadSessionRepository {
    pool: PgPool,
}

impl PgUploadSessionRepository {
    /// Create a new upload session repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UploadSessionRepository for PgUploadSessionRepository {
    async fn create(&self, data: &CreateUploadSession) -> AppResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "INSERT INTO upload_sessions \
             (id, owner_id, folder_id, name, extension, total_size, total_parts, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 'initiated', $8, $8) RETURNING *",
        )
        .bind(data.id)
        .bind(data.owner_id)
        .bind(data.folder_id)
        .bind(&data.name)
        .bind(&data.extension)
        .bind(data.total_size)
        .bind(data.total_parts)
        .bind(data.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to create upload session", e)
        })
    }

    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UploadSession>> {
        sqlx::query_as::<_, UploadSession>("SELECT * FROM upload_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find upload session", e)
            })
    }

    async fn list_parts(&self, id: SessionId) -> AppResult<Vec<UploadPart>> {
        sqlx::query_as::<_, UploadPart>(
            "SELECT * FROM upload_parts WHERE session_id = $1 ORDER BY part_number ASC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list upload parts", e))
    }

    async fn upsert_part(
        &self,
        id: SessionId,
        part_number: i32,
        size_bytes: i64,
        at: DateTime<Utc>,
    ) -> AppResult<UploadPart> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin part transaction", e)
        })?;

        // Row lock on the session serializes against `take`.
        let touched = sqlx::query_scalar::<_, SessionId>(
            "UPDATE upload_sessions SET status = 'uploading', updated_at = $2 \
             WHERE id = $1 RETURNING id",
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to touch session", e))?;

        if touched.is_none() {
            return Err(AppError::not_found(format!("Upload session {id} not found")));
        }

        let part = sqlx::query_as::<_, UploadPart>(
            "INSERT INTO upload_parts (session_id, part_number, size_bytes, uploaded_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (session_id, part_number) \
             DO UPDATE SET size_bytes = EXCLUDED.size_bytes, uploaded_at = EXCLUDED.uploaded_at \
             RETURNING *",
        )
        .bind(id)
        .bind(part_number)
        .bind(size_bytes)
        .bind(at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to record part", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit part", e)
        })?;
        Ok(part)
    }

    async fn take(&self, id: SessionId) -> AppResult<Option<ClaimedSession>> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin claim transaction", e)
        })?;

        let session = sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock session", e))?;

        let Some(session) = session else {
            return Ok(None);
        };

        let mut parts = sqlx::query_as::<_, UploadPart>(
            "DELETE FROM upload_parts WHERE session_id = $1 RETURNING *",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete parts", e))?;
        parts.sort_by_key(|p| p.part_number);

        sqlx::query("DELETE FROM upload_sessions WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete session", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit claim", e)
        })?;

        Ok(Some(ClaimedSession { session, parts }))
    }

    async fn delete(&self, id: SessionId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM upload_sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to delete upload session", e)
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE created_at <= $1 ORDER BY created_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list stale sessions", e)
        })
    }

    async fn list_by_owner(&self, owner: OwnerId) -> AppResult<Vec<UploadSession>> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT * FROM upload_sessions WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list upload sessions", e)
        })
    }
}
