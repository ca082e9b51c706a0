//! Process-local metadata store for single-node deployments and tests.
//!
//! All four repository traits are served from one state guarded by a single
//! Tokio mutex, so every operation (including subtree cascades and session
//! claims) is atomic with respect to every other.

mod file;
mod folder;
mod quota;
mod upload;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use stash_core::result::AppResult;
use stash_core::types::{FileId, FolderId, OwnerId, SessionId};
use stash_entity::account::StorageAccount;
use stash_entity::file::FileRecord;
use stash_entity::folder::FolderRecord;
use stash_entity::upload::{UploadPart, UploadSession};

use crate::locks::OwnerGuard;
use crate::traits::OwnerLockManager;

/// Internal tables of the memory store.
#[derive(Debug, Default)]
struct MemoryState {
    accounts: HashMap<OwnerId, StorageAccount>,
    sessions: HashMap<SessionId, UploadSession>,
    parts: BTreeMap<(SessionId, i32), UploadPart>,
    folders: HashMap<FolderId, FolderRecord>,
    files: HashMap<FileId, FileRecord>,
    owner_locks: HashMap<OwnerId, Arc<Mutex<()>>>,
}

impl MemoryState {
    /// Owner-scoped closure of `root`, root first. Empty if `root` is absent.
    fn closure(&self, owner: OwnerId, root: FolderId) -> Vec<FolderId> {
        if !self
            .folders
            .get(&root)
            .is_some_and(|f| f.owner_id == owner)
        {
            return Vec::new();
        }

        let mut seen = HashSet::from([root]);
        let mut order = vec![root];
        let mut queue = VecDeque::from([root]);

        while let Some(current) = queue.pop_front() {
            for child in self
                .folders
                .values()
                .filter(|f| f.owner_id == owner && f.parent_id == Some(current))
            {
                if seen.insert(child.id) {
                    order.push(child.id);
                    queue.push_back(child.id);
                }
            }
        }
        order
    }

    /// Whether `folder` exists and belongs to `owner`.
    fn owns_folder(&self, owner: OwnerId, folder: FolderId) -> bool {
        self.folders.get(&folder).is_some_and(|f| f.owner_id == owner)
    }

    fn session_parts(&self, id: SessionId) -> Vec<UploadPart> {
        self.parts
            .range((id, i32::MIN)..=(id, i32::MAX))
            .map(|(_, p)| p.clone())
            .collect()
    }
}

/// In-memory implementation of every metadata repository.
///
/// Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OwnerLockManager for MemoryStore {
    async fn lock_owner(&self, owner: OwnerId) -> AppResult<OwnerGuard> {
        let mutex = self
            .state
            .lock()
            .await
            .owner_locks
            .entry(owner)
            .or_default()
            .clone();
        Ok(OwnerGuard::memory(mutex.lock_owned().await))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use stash_core::error::ErrorKind;
    use stash_entity::file::CreateFile;
    use stash_entity::folder::{CreateFolder, TreeDeletion};
    use stash_entity::upload::{CreateUploadSession, UploadState};

    use super::*;
    use crate::traits::{FileRepository, FolderRepository, QuotaLedger, UploadSessionRepository};

    async fn folder(store: &MemoryStore, owner: OwnerId, parent: Option<FolderId>) -> FolderId {
        FolderRepository::create(
            store,
            &CreateFolder {
                owner_id: owner,
                parent_id: parent,
                name: "dir".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn file(store: &MemoryStore, owner: OwnerId, folder: Option<FolderId>, key: &str) -> FileId {
        FileRepository::create(
            store,
            &CreateFile {
                owner_id: owner,
                folder_id: folder,
                name: key.into(),
                extension: "bin".into(),
                size_bytes: 10,
                physical_key: key.into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .id
    }

    #[tokio::test]
    async fn test_reserve_rejects_overflow_and_release_clamps() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        store.open_account(owner, 1000).await.unwrap();

        store.reserve(owner, 600).await.unwrap();
        let err = store.reserve(owner, 401).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::QuotaExceeded);
        assert_eq!(store.reserve(owner, 400).await.unwrap().used_bytes, 1000);

        assert_eq!(store.release(owner, 5000).await.unwrap().used_bytes, 0);
    }

    #[tokio::test]
    async fn test_open_account_twice_conflicts() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        store.open_account(owner, 10).await.unwrap();
        let err = store.open_account(owner, 10).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_set_used_and_set_limit_bounds() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        store.open_account(owner, 100).await.unwrap();

        assert_eq!(store.set_used(owner, -1).await.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(store.set_used(owner, 101).await.unwrap_err().kind, ErrorKind::Validation);
        store.set_used(owner, 80).await.unwrap();

        assert_eq!(store.set_limit(owner, 50).await.unwrap_err().kind, ErrorKind::Conflict);
        assert_eq!(store.set_limit(owner, 80).await.unwrap().limit_bytes, 80);
    }

    #[tokio::test]
    async fn test_concurrent_reservations_never_oversubscribe() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        store.open_account(owner, 1000).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.reserve(owner, 100).await }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                granted += 1;
            }
        }
        assert_eq!(granted, 10);
        let account = store.find_account(owner).await.unwrap().unwrap();
        assert_eq!(account.used_bytes, 1000);
    }

    #[tokio::test]
    async fn test_take_is_exclusive() {
        let store = MemoryStore::new();
        let id = SessionId::new();
        UploadSessionRepository::create(
            &store,
            &CreateUploadSession {
                id,
                owner_id: OwnerId::new(),
                folder_id: None,
                name: "movie".into(),
                extension: "mp4".into(),
                total_size: 20,
                total_parts: 2,
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        store.upsert_part(id, 2, 10, Utc::now()).await.unwrap();
        store.upsert_part(id, 1, 10, Utc::now()).await.unwrap();
        let session = UploadSessionRepository::find_by_id(&store, id).await.unwrap().unwrap();
        assert_eq!(session.status, UploadState::Uploading);

        let claimed = store.take(id).await.unwrap().unwrap();
        let numbers: Vec<i32> = claimed.parts.iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        assert!(store.take(id).await.unwrap().is_none());
        let err = store.upsert_part(id, 1, 10, Utc::now()).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_cascade_soft_delete_and_restore() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let root = folder(&store, owner, None).await;
        let child = folder(&store, owner, Some(root)).await;
        let grandchild = folder(&store, owner, Some(child)).await;
        let sibling = folder(&store, owner, None).await;
        file(&store, owner, Some(grandchild), "a").await;
        file(&store, owner, Some(root), "b").await;
        let outside = file(&store, owner, Some(sibling), "c").await;

        let closure = store.descendant_closure(owner, root).await.unwrap();
        assert_eq!(closure.len(), 3);
        assert_eq!(closure[0], root);

        let summary = store.soft_delete_cascade(owner, root, Utc::now()).await.unwrap();
        assert_eq!(summary.folders, 3);
        assert_eq!(summary.files, 2);
        assert_eq!(FileRepository::list_trashed(&store, owner).await.unwrap().len(), 2);
        let untouched = FileRepository::find_by_id(&store, owner, outside).await.unwrap().unwrap();
        assert!(!untouched.is_trashed());

        let restored = store.restore_cascade(owner, root, Utc::now()).await.unwrap();
        assert_eq!(restored.files, 2);
        assert!(FolderRepository::list_trashed(&store, owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restore_child_of_trashed_parent_detaches() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let root = folder(&store, owner, None).await;
        let child = folder(&store, owner, Some(root)).await;
        store.soft_delete_cascade(owner, root, Utc::now()).await.unwrap();

        let at = Utc::now() + Duration::hours(1);
        store.restore_cascade(owner, child, at).await.unwrap();
        let record = FolderRepository::find_by_id(&store, owner, child).await.unwrap().unwrap();
        assert!(!record.is_trashed());
        assert_eq!(record.parent_id, None);
        assert_eq!(record.updated_at, at);
    }

    #[tokio::test]
    async fn test_files_only_link_to_own_folders() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let stranger = OwnerId::new();
        let theirs = folder(&store, stranger, None).await;
        let mine = folder(&store, owner, None).await;
        let id = file(&store, owner, None, "k").await;

        let err = store
            .move_to_folder(owner, id, Some(theirs), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let err = store
            .move_to_folder(owner, id, Some(FolderId::new()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
        let moved = store.move_to_folder(owner, id, Some(mine), Utc::now()).await.unwrap();
        assert_eq!(moved.folder_id, Some(mine));

        let err = FileRepository::create(
            &store,
            &CreateFile {
                owner_id: owner,
                folder_id: Some(theirs),
                name: "x".into(),
                extension: String::new(),
                size_bytes: 1,
                physical_key: "other".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let err = FolderRepository::create(
            &store,
            &CreateFolder {
                owner_id: owner,
                parent_id: Some(theirs),
                name: "x".into(),
                created_at: Utc::now(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_owner_lock_is_shared_by_clones() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let guard = store.lock_owner(owner).await.unwrap();

        let contender = {
            let store = store.clone();
            tokio::spawn(async move { store.lock_owner(owner).await.unwrap().release().await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        let _other = store.lock_owner(OwnerId::new()).await.unwrap();
        guard.release().await.unwrap();
        contender.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_live_or_trashed_rows() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let live = file(&store, owner, None, "live").await;
        let trashed = file(&store, owner, None, "trashed").await;
        store.soft_delete(owner, trashed, Utc::now()).await.unwrap();

        assert!(FileRepository::delete(&store, OwnerId::new(), live).await.unwrap().is_none());
        assert!(FileRepository::delete(&store, owner, live).await.unwrap().is_some());
        assert!(FileRepository::delete(&store, owner, trashed).await.unwrap().is_some());
        assert!(FileRepository::delete(&store, owner, live).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closure_is_scoped_by_owner() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let root = folder(&store, owner, None).await;
        assert!(store.descendant_closure(OwnerId::new(), root).await.unwrap().is_empty());
        let err = store
            .soft_delete_cascade(OwnerId::new(), root, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_tree_policies() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let root = folder(&store, owner, None).await;
        let child = folder(&store, owner, Some(root)).await;
        file(&store, owner, Some(child), "k1").await;

        let err = store
            .delete_tree(owner, root, TreeDeletion::Trashed)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        let trashed_at = Utc::now() - Duration::days(40);
        store.soft_delete_cascade(owner, root, trashed_at).await.unwrap();

        let err = store
            .delete_tree(owner, root, TreeDeletion::ExpiredAndEmpty { cutoff: Utc::now() })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);

        let deleted = store.delete_tree(owner, root, TreeDeletion::Trashed).await.unwrap();
        assert_eq!(deleted.folder_ids.len(), 2);
        assert_eq!(deleted.physical_keys(), vec!["k1".to_string()]);
        assert!(FolderRepository::find_by_id(&store, owner, child).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_trashed_respects_cutoff() {
        let store = MemoryStore::new();
        let owner = OwnerId::new();
        let id = file(&store, owner, None, "x").await;
        let now = Utc::now();

        assert!(store.delete_trashed(owner, id, None).await.unwrap().is_none());

        store.soft_delete(owner, id, now - Duration::days(30)).await.unwrap();
        let early = now - Duration::days(31);
        assert!(store.delete_trashed(owner, id, Some(early)).await.unwrap().is_none());
        let cutoff = now - Duration::days(30);
        assert!(store.delete_trashed(owner, id, Some(cutoff)).await.unwrap().is_some());
    }
}
