use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::types::{FileId, FolderId, OwnerId};
use stash_entity::file::{CreateFile, FileRecord};

use super::MemoryStore;
use crate::traits::FileRepository;

fn missing(id: FileId) -> AppError {
    AppError::not_found(format!("File {id} not found"))
}

#[async_trait]
impl FileRepository for MemoryStore {
    async fn create(&self, data: &CreateFile) -> AppResult<FileRecord> {
        let mut state = self.state.lock().await;
        if state.files.values().any(|f| f.physical_key == data.physical_key) {
            return Err(AppError::conflict(format!(
                "Physical key '{}' already in use",
                data.physical_key
            )));
        }
        if let Some(folder) = data.folder_id {
            if !state.owns_folder(data.owner_id, folder) {
                return Err(AppError::not_found("Destination folder no longer exists"));
            }
        }

        let record = FileRecord {
            id: FileId::new(),
            owner_id: data.owner_id,
            folder_id: data.folder_id,
            name: data.name.clone(),
            extension: data.extension.clone(),
            size_bytes: data.size_bytes,
            physical_key: data.physical_key.clone(),
            created_at: data.created_at,
            updated_at: data.created_at,
            deleted_at: None,
        };
        state.files.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>> {
        let state = self.state.lock().await;
        Ok(state.files.get(&id).filter(|f| f.owner_id == owner).cloned())
    }

    async fn move_to_folder(
        &self,
        owner: OwnerId,
        id: FileId,
        folder: Option<FolderId>,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        let mut state = self.state.lock().await;
        if let Some(folder) = folder {
            if !state.owns_folder(owner, folder) {
                return Err(AppError::not_found(format!("Folder {folder} not found")));
            }
        }
        let record = state
            .files
            .get_mut(&id)
            .filter(|f| f.owner_id == owner)
            .ok_or_else(|| missing(id))?;
        record.folder_id = folder;
        record.updated_at = at;
        Ok(record.clone())
    }

    async fn soft_delete(
        &self,
        owner: OwnerId,
        id: FileId,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .files
            .get_mut(&id)
            .filter(|f| f.owner_id == owner)
            .ok_or_else(|| missing(id))?;
        record.deleted_at.get_or_insert(at);
        record.updated_at = at;
        Ok(record.clone())
    }

    async fn restore(
        &self,
        owner: OwnerId,
        id: FileId,
        at: DateTime<Utc>,
    ) -> AppResult<FileRecord> {
        let mut state = self.state.lock().await;
        let record = state
            .files
            .get_mut(&id)
            .filter(|f| f.owner_id == owner)
            .ok_or_else(|| missing(id))?;
        record.deleted_at = None;
        record.updated_at = at;
        Ok(record.clone())
    }

    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FileRecord>> {
        let state = self.state.lock().await;
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner && f.is_trashed())
            .cloned()
            .collect();
        files.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then_with(|| a.name.cmp(&b.name)));
        Ok(files)
    }

    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FileRecord>> {
        let state = self.state.lock().await;
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.trashed_before(cutoff))
            .cloned()
            .collect();
        files.sort_by_key(|f| f.deleted_at);
        Ok(files)
    }

    async fn delete_trashed(
        &self,
        owner: OwnerId,
        id: FileId,
        cutoff: Option<DateTime<Utc>>,
    ) -> AppResult<Option<FileRecord>> {
        let mut state = self.state.lock().await;
        let eligible = state.files.get(&id).is_some_and(|f| {
            f.owner_id == owner
                && match cutoff {
                    Some(cutoff) => f.trashed_before(cutoff),
                    None => f.is_trashed(),
                }
        });

        if !eligible {
            return Ok(None);
        }
        Ok(state.files.remove(&id))
    }

    async fn delete(&self, owner: OwnerId, id: FileId) -> AppResult<Option<FileRecord>> {
        let mut state = self.state.lock().await;
        if !state.files.get(&id).is_some_and(|f| f.owner_id == owner) {
            return Ok(None);
        }
        Ok(state.files.remove(&id))
    }

    async fn total_size(&self, owner: OwnerId) -> AppResult<i64> {
        let state = self.state.lock().await;
        Ok(state
            .files
            .values()
            .filter(|f| f.owner_id == owner)
            .map(|f| f.size_bytes)
            .sum())
    }
}
