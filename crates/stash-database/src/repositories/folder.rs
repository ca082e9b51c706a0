//! Folder repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use stash_core::error::{AppError, ErrorKind};
use stash_core::result::AppResult;
use stash_core::types::{FolderId, OwnerId};
use stash_entity::file::FileRecord;
use stash_entity::folder::{CascadeSummary, CreateFolder, DeletedTree, FolderRecord, TreeDeletion};

use crate::traits::FolderRepository;

/// Owner-scoped closure of a folder: the root plus every descendant.
const CLOSURE_CTE: &str = "WITH RECURSIVE tree AS ( \
        SELECT id FROM folders WHERE id = $1 AND owner_id = $2 \
        UNION \
        SELECT f.id FROM folders f JOIN tree t ON f.parent_id = t.id WHERE f.owner_id = $2 \
    )";

/// Repository for folder rows and subtree operations.
#[derive(Debug, Clone)]
pub struct PgFolderRepository {
    pool: PgPool,
}

impl PgFolderRepository {
    /// Create a new folder repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin folder transaction", e)
        })
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> AppResult<()> {
        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit folder transaction", e)
        })
    }

    async fn lock_root(
        tx: &mut Transaction<'static, Postgres>,
        owner: OwnerId,
        root: FolderId,
    ) -> AppResult<Option<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE id = $1 AND owner_id = $2 FOR UPDATE",
        )
        .bind(root)
        .bind(owner)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to lock folder", e))
    }

    /// Compute the closure once and lock every folder in it.
    async fn lock_closure(
        tx: &mut Transaction<'static, Postgres>,
        owner: OwnerId,
        root: FolderId,
    ) -> AppResult<Vec<FolderId>> {
        let ids = sqlx::query_scalar::<_, FolderId>(&format!("{CLOSURE_CTE} SELECT id FROM tree"))
            .bind(root)
            .bind(owner)
            .fetch_all(&mut **tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to resolve folder tree", e)
            })?;

        sqlx::query("SELECT id FROM folders WHERE id = ANY($1) FOR UPDATE")
            .bind(&ids)
            .execute(&mut **tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to lock folder tree", e)
            })?;

        Ok(ids)
    }
}

#[async_trait]
impl FolderRepository for PgFolderRepository {
    async fn create(&self, data: &CreateFolder) -> AppResult<FolderRecord> {
        sqlx::query_as::<_, FolderRecord>(
            "INSERT INTO folders (id, owner_id, name, parent_id, created_at, updated_at) \
             SELECT $1, $2, $3, $4, $5, $5 \
             WHERE $4::uuid IS NULL \
                OR EXISTS (SELECT 1 FROM folders WHERE id = $4 AND owner_id = $2) \
             RETURNING *",
        )
        .bind(FolderId::new())
        .bind(data.owner_id)
        .bind(&data.name)
        .bind(data.parent_id)
        .bind(data.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err)
                if db_err.constraint() == Some("folders_parent_id_fkey") =>
            {
                AppError::not_found("Parent folder not found")
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create folder", e),
        })?
        .ok_or_else(|| AppError::not_found("Parent folder not found"))
    }

    async fn find_by_id(&self, owner: OwnerId, id: FolderId) -> AppResult<Option<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>("SELECT * FROM folders WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find folder", e))
    }

    async fn descendant_closure(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FolderId>> {
        sqlx::query_scalar::<_, FolderId>(&format!("{CLOSURE_CTE} SELECT id FROM tree"))
            .bind(root)
            .bind(owner)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to resolve folder tree", e)
            })
    }

    async fn soft_delete_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary> {
        let mut tx = self.begin().await?;
        if Self::lock_root(&mut tx, owner, root).await?.is_none() {
            return Err(AppError::not_found(format!("Folder {root} not found")));
        }
        let ids = Self::lock_closure(&mut tx, owner, root).await?;

        let folders = sqlx::query(
            "UPDATE folders SET deleted_at = COALESCE(deleted_at, $2), updated_at = $2 \
             WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to trash folders", e))?
        .rows_affected();

        let files = sqlx::query(
            "UPDATE files SET deleted_at = COALESCE(deleted_at, $3), updated_at = $3 \
             WHERE owner_id = $2 AND folder_id = ANY($1)",
        )
        .bind(&ids)
        .bind(owner)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to trash files", e))?
        .rows_affected();

        Self::commit(tx).await?;
        Ok(CascadeSummary { folders, files })
    }

    async fn restore_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary> {
        let mut tx = self.begin().await?;
        let record = Self::lock_root(&mut tx, owner, root)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {root} not found")))?;
        let ids = Self::lock_closure(&mut tx, owner, root).await?;

        if let Some(parent) = record.parent_id {
            let parent_trashed = sqlx::query_scalar::<_, bool>(
                "SELECT deleted_at IS NOT NULL FROM folders WHERE id = $1",
            )
            .bind(parent)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check parent", e))?
            .unwrap_or(true);

            if parent_trashed {
                sqlx::query("UPDATE folders SET parent_id = NULL WHERE id = $1")
                    .bind(root)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| {
                        AppError::with_source(ErrorKind::Database, "Failed to detach folder", e)
                    })?;
            }
        }

        let folders = sqlx::query(
            "UPDATE folders SET deleted_at = NULL, updated_at = $2 WHERE id = ANY($1)",
        )
        .bind(&ids)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to restore folders", e))?
        .rows_affected();

        let files = sqlx::query(
            "UPDATE files SET deleted_at = NULL, updated_at = $3 \
             WHERE owner_id = $2 AND folder_id = ANY($1)",
        )
        .bind(&ids)
        .bind(owner)
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to restore files", e))?
        .rows_affected();

        Self::commit(tx).await?;
        Ok(CascadeSummary { folders, files })
    }

    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE owner_id = $1 AND deleted_at IS NOT NULL \
             ORDER BY deleted_at DESC, name ASC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list trashed folders", e)
        })
    }

    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FolderRecord>> {
        sqlx::query_as::<_, FolderRecord>(
            "SELECT * FROM folders WHERE deleted_at IS NOT NULL AND deleted_at <= $1 \
             ORDER BY deleted_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list expired folders", e)
        })
    }

    async fn files_in_tree(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FileRecord>> {
        sqlx::query_as::<_, FileRecord>(&format!(
            "{CLOSURE_CTE} SELECT * FROM files \
             WHERE owner_id = $2 AND folder_id IN (SELECT id FROM tree) ORDER BY name ASC"
        ))
        .bind(root)
        .bind(owner)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list tree files", e))
    }

    async fn delete_tree(
        &self,
        owner: OwnerId,
        root: FolderId,
        policy: TreeDeletion,
    ) -> AppResult<DeletedTree> {
        let mut tx = self.begin().await?;
        let record = Self::lock_root(&mut tx, owner, root)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder {root} not found")))?;

        let eligible = match policy {
            TreeDeletion::Trashed => record.is_trashed(),
            TreeDeletion::ExpiredAndEmpty { cutoff } => record.trashed_before(cutoff),
        };
        if !eligible {
            return Err(AppError::not_found(format!(
                "Folder {root} is not eligible for permanent deletion"
            )));
        }

        let ids = Self::lock_closure(&mut tx, owner, root).await?;

        if let TreeDeletion::ExpiredAndEmpty { .. } = policy {
            let (files, live_folders) = sqlx::query_as::<_, (i64, i64)>(
                "SELECT \
                   (SELECT COUNT(*) FROM files WHERE owner_id = $2 AND folder_id = ANY($1)), \
                   (SELECT COUNT(*) FROM folders WHERE id = ANY($1) AND deleted_at IS NULL)",
            )
            .bind(&ids)
            .bind(owner)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to inspect tree", e))?;

            if files > 0 || live_folders > 0 {
                return Err(AppError::conflict(format!(
                    "Folder {root} still holds {files} files and {live_folders} live folders"
                )));
            }
        }

        let files = sqlx::query_as::<_, FileRecord>(
            "DELETE FROM files WHERE owner_id = $2 AND folder_id = ANY($1) RETURNING *",
        )
        .bind(&ids)
        .bind(owner)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to delete tree files", e))?;

        let folder_ids = sqlx::query_scalar::<_, FolderId>(
            "DELETE FROM folders WHERE id = ANY($1) RETURNING id",
        )
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to delete tree folders", e)
        })?;

        Self::commit(tx).await?;
        Ok(DeletedTree { folder_ids, files })
    }
}
