use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::types::{FolderId, OwnerId};
use stash_entity::file::FileRecord;
use stash_entity::folder::{CascadeSummary, CreateFolder, DeletedTree, FolderRecord, TreeDeletion};

use super::MemoryStore;
use crate::traits::FolderRepository;

fn missing(id: FolderId) -> AppError {
    AppError::not_found(format!("Folder {id} not found"))
}

#[async_trait]
impl FolderRepository for MemoryStore {
    async fn create(&self, data: &CreateFolder) -> AppResult<FolderRecord> {
        let mut state = self.state.lock().await;
        if let Some(parent) = data.parent_id {
            if !state.owns_folder(data.owner_id, parent) {
                return Err(AppError::not_found("Parent folder not found"));
            }
        }

        let record = FolderRecord {
            id: FolderId::new(),
            owner_id: data.owner_id,
            name: data.name.clone(),
            parent_id: data.parent_id,
            created_at: data.created_at,
            updated_at: data.created_at,
            deleted_at: None,
        };
        state.folders.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, owner: OwnerId, id: FolderId) -> AppResult<Option<FolderRecord>> {
        let state = self.state.lock().await;
        Ok(state.folders.get(&id).filter(|f| f.owner_id == owner).cloned())
    }

    async fn descendant_closure(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FolderId>> {
        Ok(self.state.lock().await.closure(owner, root))
    }

    async fn soft_delete_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary> {
        let mut state = self.state.lock().await;
        let ids = state.closure(owner, root);
        if ids.is_empty() {
            return Err(missing(root));
        }

        let mut summary = CascadeSummary::default();
        for id in &ids {
            if let Some(folder) = state.folders.get_mut(id) {
                folder.deleted_at.get_or_insert(at);
                folder.updated_at = at;
                summary.folders += 1;
            }
        }
        for file in state.files.values_mut() {
            if file.owner_id == owner && file.folder_id.is_some_and(|f| ids.contains(&f)) {
                file.deleted_at.get_or_insert(at);
                file.updated_at = at;
                summary.files += 1;
            }
        }
        Ok(summary)
    }

    async fn restore_cascade(
        &self,
        owner: OwnerId,
        root: FolderId,
        at: DateTime<Utc>,
    ) -> AppResult<CascadeSummary> {
        let mut state = self.state.lock().await;
        let ids = state.closure(owner, root);
        if ids.is_empty() {
            return Err(missing(root));
        }

        let parent_live = state
            .folders
            .get(&root)
            .and_then(|f| f.parent_id)
            .map(|parent| state.folders.get(&parent).is_some_and(|p| !p.is_trashed()));

        let mut summary = CascadeSummary::default();
        for id in &ids {
            if let Some(folder) = state.folders.get_mut(id) {
                if *id == root && parent_live == Some(false) {
                    folder.parent_id = None;
                }
                folder.deleted_at = None;
                folder.updated_at = at;
                summary.folders += 1;
            }
        }
        for file in state.files.values_mut() {
            if file.owner_id == owner && file.folder_id.is_some_and(|f| ids.contains(&f)) {
                file.deleted_at = None;
                file.updated_at = at;
                summary.files += 1;
            }
        }
        Ok(summary)
    }

    async fn list_trashed(&self, owner: OwnerId) -> AppResult<Vec<FolderRecord>> {
        let state = self.state.lock().await;
        let mut folders: Vec<FolderRecord> = state
            .folders
            .values()
            .filter(|f| f.owner_id == owner && f.is_trashed())
            .cloned()
            .collect();
        folders.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at).then_with(|| a.name.cmp(&b.name)));
        Ok(folders)
    }

    async fn list_trashed_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<FolderRecord>> {
        let state = self.state.lock().await;
        let mut folders: Vec<FolderRecord> = state
            .folders
            .values()
            .filter(|f| f.trashed_before(cutoff))
            .cloned()
            .collect();
        folders.sort_by_key(|f| f.deleted_at);
        Ok(folders)
    }

    async fn files_in_tree(&self, owner: OwnerId, root: FolderId) -> AppResult<Vec<FileRecord>> {
        let state = self.state.lock().await;
        let ids = state.closure(owner, root);
        let mut files: Vec<FileRecord> = state
            .files
            .values()
            .filter(|f| f.owner_id == owner && f.folder_id.is_some_and(|id| ids.contains(&id)))
            .cloned()
            .collect();
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    async fn delete_tree(
        &self,
        owner: OwnerId,
        root: FolderId,
        policy: TreeDeletion,
    ) -> AppResult<DeletedTree> {
        let mut state = self.state.lock().await;
        let record = state
            .folders
            .get(&root)
            .filter(|f| f.owner_id == owner)
            .ok_or_else(|| missing(root))?;

        let eligible = match policy {
            TreeDeletion::Trashed => record.is_trashed(),
            TreeDeletion::ExpiredAndEmpty { cutoff } => record.trashed_before(cutoff),
        };
        if !eligible {
            return Err(AppError::not_found(format!(
                "Folder {root} is not eligible for permanent deletion"
            )));
        }

        let ids = state.closure(owner, root);
        let in_tree =
            |f: &FileRecord| f.owner_id == owner && f.folder_id.is_some_and(|id| ids.contains(&id));

        if let TreeDeletion::ExpiredAndEmpty { .. } = policy {
            let files = state.files.values().filter(|f| in_tree(f)).count();
            let live_folders = ids
                .iter()
                .filter_map(|id| state.folders.get(id))
                .filter(|f| !f.is_trashed())
                .count();
            if files > 0 || live_folders > 0 {
                return Err(AppError::conflict(format!(
                    "Folder {root} still holds {files} files and {live_folders} live folders"
                )));
            }
        }

        let file_ids: Vec<_> = state
            .files
            .values()
            .filter(|f| in_tree(f))
            .map(|f| f.id)
            .collect();
        let files = file_ids
            .iter()
            .filter_map(|id| state.files.remove(id))
            .collect();
        let folder_ids = ids
            .iter()
            .filter(|id| state.folders.remove(id).is_some())
            .copied()
            .collect();

        // Sessions aimed at a removed folder fall back to the root.
        for session in state.sessions.values_mut() {
            if session.folder_id.is_some_and(|f| ids.contains(&f)) {
                session.folder_id = None;
            }
        }

        Ok(DeletedTree { folder_ids, files })
    }
}
