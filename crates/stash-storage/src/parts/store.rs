//! Working areas of in-flight uploads.

use std::sync::Arc;

use tracing::{debug, warn};

use stash_core::result::AppResult;
use stash_core::traits::storage::{ByteStream, StorageProvider};
use stash_core::types::SessionId;

use crate::layout;

/// A part streamed into its private temporary key, not yet visible in the
/// part's slot.
#[derive(Debug)]
#[must_use = "a staged part must be committed or discarded"]
pub struct StagedPart {
    session: SessionId,
    part_number: i32,
    tmp_key: String,
    size_bytes: i64,
}

impl StagedPart {
    /// Bytes written.
    pub fn size_bytes(&self) -> i64 {
        self.size_bytes
    }

    /// Part number this write belongs to.
    pub fn part_number(&self) -> i32 {
        self.part_number
    }
}

/// Writes part bytes into per-session working areas.
///
/// A part is first streamed to a unique temporary key and then renamed over
/// its slot, so a slot only ever holds one writer's complete bytes.
#[derive(Debug, Clone)]
pub struct PartStore {
    provider: Arc<dyn StorageProvider>,
}

impl PartStore {
    /// Create a part store on top of a provider.
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        Self { provider }
    }

    /// Create the working area of a session.
    pub async fn create_area(&self, session: SessionId) -> AppResult<()> {
        self.provider.create_dir(&layout::session_dir(session)).await
    }

    /// Remove the working area of a session and everything in it.
    pub async fn remove_area(&self, session: SessionId) -> AppResult<()> {
        self.provider.delete_dir(&layout::session_dir(session)).await?;
        debug!(session_id = %session, "Removed upload working area");
        Ok(())
    }

    /// Stream a part into a fresh temporary key.
    ///
    /// On failure the temporary key is removed before the error returns.
    pub async fn stage(
        &self,
        session: SessionId,
        part_number: i32,
        stream: ByteStream,
    ) -> AppResult<StagedPart> {
        let tmp_key = layout::staging_key(session, part_number);

        match self.provider.write_stream(&tmp_key, stream).await {
            Ok(written) => Ok(StagedPart {
                session,
                part_number,
                tmp_key,
                size_bytes: written as i64,
            }),
            Err(e) => {
                if let Err(cleanup) = self.provider.delete(&tmp_key).await {
                    warn!(key = %tmp_key, error = %cleanup, "Failed to remove partial part");
                }
                Err(e)
            }
        }
    }

    /// Move a staged part over its slot, replacing any earlier attempt.
    pub async fn commit(&self, staged: StagedPart) -> AppResult<i64> {
        let slot = layout::part_key(staged.session, staged.part_number);
        self.provider.rename(&staged.tmp_key, &slot).await?;
        Ok(staged.size_bytes)
    }

    /// Drop a staged part without touching the slot.
    pub async fn discard(&self, staged: StagedPart) -> AppResult<()> {
        self.provider.delete(&staged.tmp_key).await
    }

    /// Size of a committed part as stored.
    pub async fn part_size(&self, session: SessionId, part_number: i32) -> AppResult<u64> {
        let meta = self
            .provider
            .metadata(&layout::part_key(session, part_number))
            .await?;
        Ok(meta.size_bytes)
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::providers::LocalStorageProvider;

    fn bytes_stream(data: &'static [u8]) -> ByteStream {
        Box::pin(futures::stream::iter(vec![Ok(Bytes::from_static(data))]))
    }

    async fn store() -> (tempfile::TempDir, Arc<LocalStorageProvider>, PartStore) {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(
            LocalStorageProvider::new(dir.path().to_str().unwrap())
                .await
                .unwrap(),
        );
        let store = PartStore::new(provider.clone());
        (dir, provider, store)
    }

    #[tokio::test]
    async fn test_stage_commit_overwrites_slot() {
        let (_dir, provider, store) = store().await;
        let session = SessionId::new();
        store.create_area(session).await.unwrap();

        let first = store.stage(session, 1, bytes_stream(b"first attempt")).await.unwrap();
        store.commit(first).await.unwrap();
        let second = store.stage(session, 1, bytes_stream(b"retry")).await.unwrap();
        assert_eq!(second.size_bytes(), 5);
        store.commit(second).await.unwrap();

        assert_eq!(store.part_size(session, 1).await.unwrap(), 5);
        let slot = provider.read_bytes(&layout::part_key(session, 1)).await.unwrap();
        assert_eq!(slot, Bytes::from_static(b"retry"));
        assert_eq!(provider.list(&layout::session_dir(session)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_stream_leaves_no_temp() {
        let (_dir, provider, store) = store().await;
        let session = SessionId::new();
        store.create_area(session).await.unwrap();

        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(std::io::Error::other("connection reset")),
        ];
        let result = store.stage(session, 2, Box::pin(futures::stream::iter(chunks))).await;
        assert!(result.is_err());
        assert!(provider.list(&layout::session_dir(session)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_area() {
        let (_dir, provider, store) = store().await;
        let session = SessionId::new();
        store.create_area(session).await.unwrap();
        let staged = store.stage(session, 1, bytes_stream(b"x")).await.unwrap();
        store.discard(staged).await.unwrap();

        store.remove_area(session).await.unwrap();
        assert!(!provider.exists(&layout::session_dir(session)).await.unwrap());
        store.remove_area(session).await.unwrap();
    }
}
