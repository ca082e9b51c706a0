//! Removal of working areas that no session row refers to.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use stash_core::result::AppResult;
use stash_core::traits::storage::StorageProvider;
use stash_core::types::SessionId;

use crate::layout;

/// A working area found on storage.
#[derive(Debug, Clone)]
pub struct WorkingArea {
    /// Session the area belongs to.
    pub session: SessionId,
    /// Key of the area directory.
    pub key: String,
    /// Last modification of the directory, if known.
    pub modified_at: Option<DateTime<Utc>>,
}

/// Finds and removes orphaned upload working areas.
#[derive(Debug, Clone)]
pub struct OrphanAreaCleanup {
    provider: Arc<dyn StorageProvider>,
}

impl OrphanAreaCleanup {
    /// Create a cleanup handler on top of a provider.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Every working area currently on storage. Entries that are not
    /// session directories are ignored.
    pub async fn list_areas(&self) -> AppResult<Vec<WorkingArea>> {
        let entries = self.provider.list(layout::UPLOADS_PREFIX).await?;
        Ok(entries
            .into_iter()
            .filter(|e| e.is_directory)
            .filter_map(|e| {
                let session = layout::session_from_dir(&e.path)?;
                Some(WorkingArea {
                    session,
                    key: e.path,
                    modified_at: e.last_modified,
                })
            })
            .collect())
    }

    /// Remove areas whose session is not in `live` and that were last
    /// modified at or before `cutoff`. Returns the number removed.
    ///
    /// Areas with an unknown modification time are kept.
    pub async fn sweep(&self, live: &HashSet<SessionId>, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let mut removed = 0u64;
        for area in self.list_areas().await? {
            if live.contains(&area.session) {
                continue;
            }
            if !area.modified_at.is_some_and(|at| at <= cutoff) {
                continue;
            }

            match self.provider.delete_dir(&area.key).await {
                Ok(()) => {
                    debug!(session_id = %area.session, "Removed orphan working area");
                    removed += 1;
                }
                Err(e) => {
                    warn!(
                        session_id = %area.session,
                        error = %e,
                        "Failed to remove orphan working area"
                    );
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::providers::LocalStorageProvider;

    #[tokio::test]
    async fn test_sweep_keeps_live_and_recent_areas() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            LocalStorageProvider::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let cleanup = OrphanAreaCleanup::new(provider.clone());

        let live = SessionId::new();
        let orphan = SessionId::new();
        provider.create_dir(&layout::session_dir(live)).await.unwrap();
        provider.create_dir(&layout::session_dir(orphan)).await.unwrap();
        provider.create_dir("uploads/scratch").await.unwrap();

        assert_eq!(cleanup.list_areas().await.unwrap().len(), 2);

        let live_set = HashSet::from([live]);
        let past = Utc::now() - Duration::hours(1);
        assert_eq!(cleanup.sweep(&live_set, past).await.unwrap(), 0);

        let future = Utc::now() + Duration::hours(1);
        assert_eq!(cleanup.sweep(&live_set, future).await.unwrap(), 1);
        assert!(provider.exists(&layout::session_dir(live)).await.unwrap());
        assert!(!provider.exists(&layout::session_dir(orphan)).await.unwrap());
    }
}
