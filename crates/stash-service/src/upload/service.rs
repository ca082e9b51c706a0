//! Chunked upload sessions: reservation, part intake, assembly, and abort.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

use stash_core::config::StorageConfig;
use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::traits::{ByteStream, Clock, StorageProvider};
use stash_core::types::{FolderId, OwnerId, SessionId};
use stash_database::{FileRepository, FolderRepository, UploadSessionRepository};
use stash_entity::file::{CreateFile, FileRecord};
use stash_entity::upload::{
    ClaimedSession, CreateUploadSession, UploadPart, UploadProgress, UploadSession, UploadState,
};
use stash_storage::{OrphanAreaCleanup, PartAssembler, PartStore, layout};

use crate::locks::KeyedLocks;
use crate::quota::QuotaService;

/// Parameters of a new upload session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct InitUploadRequest {
    /// The uploading account.
    pub owner_id: OwnerId,
    /// Destination folder (None = root).
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// Extension without the leading dot.
    pub extension: String,
    /// Declared total size in bytes; reserved up front.
    pub total_size: i64,
    /// Number of parts.
    pub total_parts: i32,
}

/// Manages the lifecycle of chunked upload sessions.
#[derive(Debug, Clone)]
pub struct UploadService {
    sessions: Arc<dyn UploadSessionRepository>,
    files: Arc<dyn FileRepository>,
    folders: Arc<dyn FolderRepository>,
    quota: Arc<QuotaService>,
    parts: PartStore,
    assembler: PartAssembler,
    provider: Arc<dyn StorageProvider>,
    orphans: OrphanAreaCleanup,
    session_locks: Arc<KeyedLocks<SessionId, RwLock<()>>>,
    part_locks: Arc<KeyedLocks<(SessionId, i32)>>,
    clock: Arc<dyn Clock>,
    config: StorageConfig,
}

impl UploadService {
    /// Create a new upload service.
    pub fn new(
        sessions: Arc<dyn UploadSessionRepository>,
        files: Arc<dyn FileRepository>,
        folders: Arc<dyn FolderRepository>,
        quota: Arc<QuotaService>,
        provider: Arc<dyn StorageProvider>,
        clock: Arc<dyn Clock>,
        config: StorageConfig,
    ) -> Self {
        Self {
            sessions,
            files,
            folders,
            quota,
            parts: PartStore::new(provider.clone()),
            assembler: PartAssembler::new(provider.clone()),
            orphans: OrphanAreaCleanup::new(provider.clone()),
            provider,
            session_locks: Arc::new(KeyedLocks::new()),
            part_locks: Arc::new(KeyedLocks::new()),
            clock,
            config,
        }
    }

    fn validate(&self, req: &InitUploadRequest) -> AppResult<()> {
        if req.name.trim().is_empty() {
            return Err(AppError::validation("File name must not be empty"));
        }
        if req.total_size < 0 {
            return Err(AppError::validation("Total size must not be negative"));
        }
        if req.total_size > self.config.max_upload_size_bytes {
            return Err(AppError::validation(format!(
                "Upload exceeds maximum size of {} bytes",
                self.config.max_upload_size_bytes
            )));
        }
        if req.total_parts < 1 || req.total_parts > self.config.max_parts {
            return Err(AppError::validation(format!(
                "Part count must be between 1 and {}",
                self.config.max_parts
            )));
        }
        Ok(())
    }

    /// Return a reservation, logging instead of failing.
    async fn release_quietly(&self, owner: OwnerId, bytes: i64, session: SessionId) {
        if let Err(e) = self.quota.release(owner, bytes).await {
            warn!(
                owner_id = %owner,
                session_id = %session,
                bytes,
                error = %e,
                "Failed to release reservation"
            );
        }
    }

    async fn remove_area_quietly(&self, session: SessionId) {
        if let Err(e) = self.parts.remove_area(session).await {
            warn!(session_id = %session, error = %e, "Failed to remove working area");
        }
        self.part_locks.forget_where(|(id, _)| *id == session);
        self.session_locks.forget_where(|id| *id == session);
    }

    /// Claim a session once no part is being committed into it.
    async fn claim(&self, session_id: SessionId) -> AppResult<ClaimedSession> {
        let _exclusive = self.session_locks.write(session_id).await;
        self.sessions
            .take(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {session_id} not found")))
    }

    /// Reserve quota and open a session with an empty working area.
    pub async fn init_session(&self, req: InitUploadRequest) -> AppResult<UploadSession> {
        self.validate(&req)?;

        if let Some(folder_id) = req.folder_id {
            self.folders
                .find_by_id(req.owner_id, folder_id)
                .await?
                .filter(|f| !f.is_trashed())
                .ok_or_else(|| AppError::not_found(format!("Folder {folder_id} not found")))?;
        }

        self.quota.reserve(req.owner_id, req.total_size).await?;

        let id = SessionId::new();
        let created = self
            .sessions
            .create(&CreateUploadSession {
                id,
                owner_id: req.owner_id,
                folder_id: req.folder_id,
                name: req.name.clone(),
                extension: req.extension.clone(),
                total_size: req.total_size,
                total_parts: req.total_parts,
                created_at: self.clock.now(),
            })
            .await;

        let session = match created {
            Ok(session) => session,
            Err(e) => {
                self.release_quietly(req.owner_id, req.total_size, id).await;
                return Err(e);
            }
        };

        if let Err(e) = self.parts.create_area(id).await {
            if let Err(cleanup) = self.sessions.delete(id).await {
                warn!(session_id = %id, error = %cleanup, "Failed to remove session row");
            }
            self.release_quietly(req.owner_id, req.total_size, id).await;
            return Err(e);
        }

        info!(
            session_id = %id,
            owner_id = %req.owner_id,
            total_size = req.total_size,
            total_parts = req.total_parts,
            "Upload session initiated"
        );
        Ok(session)
    }

    /// Stream one part into its slot, replacing any earlier attempt.
    pub async fn upload_part(
        &self,
        session_id: SessionId,
        part_number: i32,
        body: ByteStream,
    ) -> AppResult<UploadPart> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {session_id} not found")))?;

        if !session.accepts_part(part_number) {
            return Err(AppError::validation(format!(
                "Part number {part_number} is outside 1..={}",
                session.total_parts
            )));
        }

        let staged = self.parts.stage(session_id, part_number, body).await?;
        if staged.size_bytes() > session.total_size {
            let size = staged.size_bytes();
            self.parts.discard(staged).await?;
            return Err(AppError::validation(format!(
                "Part {part_number} holds {size} bytes, more than the declared total {}",
                session.total_size
            )));
        }

        let shared = self.session_locks.read(session_id).await;
        let slot = self.part_locks.lock((session_id, part_number)).await;

        if self.sessions.find_by_id(session_id).await?.is_none() {
            drop(slot);
            drop(shared);
            self.part_locks.forget_where(|(id, _)| *id == session_id);
            self.session_locks.forget_where(|id| *id == session_id);
            self.parts.discard(staged).await?;
            return Err(AppError::not_found(format!(
                "Upload session {session_id} not found"
            )));
        }

        let size = self.parts.commit(staged).await?;
        self.sessions
            .upsert_part(session_id, part_number, size, self.clock.now())
            .await
    }

    /// Bytes recorded so far for a session.
    pub async fn progress(&self, session_id: SessionId) -> AppResult<UploadProgress> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {session_id} not found")))?;
        let parts = self.sessions.list_parts(session_id).await?;
        Ok(UploadProgress::from_parts(&session, &parts))
    }

    fn require_all_parts(session: &UploadSession, parts: &[UploadPart]) -> AppResult<()> {
        let missing = session.missing_parts(parts);
        if !missing.is_empty() {
            return Err(AppError::integrity(format!(
                "Upload session {} is missing parts {missing:?}",
                session.id
            )));
        }
        Ok(())
    }

    /// Assemble all parts into a new file and close the session.
    ///
    /// Missing or short parts fail with `Integrity` before the session is
    /// claimed. Once claimed, any failure returns the whole reservation and
    /// removes the working area and any partial object.
    pub async fn complete(&self, session_id: SessionId) -> AppResult<FileRecord> {
        let session = self
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Upload session {session_id} not found")))?;
        let parts = self.sessions.list_parts(session_id).await?;
        Self::require_all_parts(&session, &parts)?;
        self.assembler.verify(session_id, &parts).await?;

        let claimed = self.claim(session_id).await?;
        let session = claimed.session;
        let mut reserved = session.total_size;

        let result = self.finish(&session, &claimed.parts, &mut reserved).await;
        self.remove_area_quietly(session_id).await;

        match result {
            Ok(file) => {
                info!(
                    session_id = %session_id,
                    owner_id = %session.owner_id,
                    file_id = %file.id,
                    size_bytes = file.size_bytes,
                    state = %UploadState::Completed,
                    "Upload completed"
                );
                Ok(file)
            }
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    owner_id = %session.owner_id,
                    released = reserved,
                    error = %e,
                    "Upload completion failed, releasing reservation"
                );
                self.release_quietly(session.owner_id, reserved, session_id)
                    .await;
                Err(e)
            }
        }
    }

    /// Steps of `complete` after the claim. `reserved` tracks how much of
    /// the owner's quota this upload holds so the caller can return it.
    async fn finish(
        &self,
        session: &UploadSession,
        parts: &[UploadPart],
        reserved: &mut i64,
    ) -> AppResult<FileRecord> {
        Self::require_all_parts(session, parts)?;
        self.assembler.verify(session.id, parts).await?;

        let key = layout::new_object_key();
        let written = self.assembler.assemble(session.id, parts, &key).await? as i64;

        match self.record_file(session, &key, written, reserved).await {
            Ok(file) => Ok(file),
            Err(e) => {
                if let Err(cleanup) = self.provider.delete(&key).await {
                    warn!(key = %key, error = %cleanup, "Failed to remove assembled object");
                }
                Err(e)
            }
        }
    }

    async fn record_file(
        &self,
        session: &UploadSession,
        key: &str,
        size: i64,
        reserved: &mut i64,
    ) -> AppResult<FileRecord> {
        let owner = session.owner_id;
        if size < *reserved {
            self.quota.release(owner, *reserved - size).await?;
            *reserved = size;
        } else if size > *reserved {
            self.quota.reserve(owner, size - *reserved).await?;
            *reserved = size;
        }

        let folder_id = match session.folder_id {
            Some(folder) => {
                let live = self
                    .folders
                    .find_by_id(owner, folder)
                    .await?
                    .is_some_and(|f| !f.is_trashed());
                if !live {
                    warn!(
                        session_id = %session.id,
                        folder_id = %folder,
                        "Destination folder is gone, storing file at root"
                    );
                }
                live.then_some(folder)
            }
            None => None,
        };

        self.files
            .create(&CreateFile {
                owner_id: owner,
                folder_id,
                name: session.name.clone(),
                extension: session.extension.clone(),
                size_bytes: size,
                physical_key: key.to_string(),
                created_at: self.clock.now(),
            })
            .await
    }

    /// Cancel a session and return its reservation.
    pub async fn abort(&self, session_id: SessionId) -> AppResult<UploadSession> {
        self.end_session(session_id, UploadState::Aborted).await
    }

    /// Remove a session that timed out. Same steps as [`Self::abort`].
    pub async fn purge_session(&self, session_id: SessionId) -> AppResult<UploadSession> {
        self.end_session(session_id, UploadState::Purged).await
    }

    async fn end_session(
        &self,
        session_id: SessionId,
        outcome: UploadState,
    ) -> AppResult<UploadSession> {
        let claimed = self.claim(session_id).await?;
        let session = claimed.session;

        let released = self.quota.release(session.owner_id, session.total_size).await;
        self.remove_area_quietly(session_id).await;
        released?;

        info!(
            session_id = %session_id,
            owner_id = %session.owner_id,
            released = session.total_size,
            state = %outcome,
            "Upload session closed"
        );
        Ok(session)
    }

    /// Sessions created at or before `cutoff`, oldest first.
    pub async fn stale_sessions(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadSession>> {
        self.sessions.list_created_before(cutoff).await
    }

    /// Remove working areas with no session row, untouched since `cutoff`.
    pub async fn sweep_orphan_areas(&self, cutoff: DateTime<Utc>) -> AppResult<u64> {
        let live: HashSet<SessionId> = self
            .sessions
            .list_created_before(self.clock.now())
            .await?
            .into_iter()
            .map(|s| s.id)
            .collect();
        self.orphans.sweep(&live, cutoff).await
    }
}
