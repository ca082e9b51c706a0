use async_trait::async_trait;
use chrono::{DateTime, Utc};

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::types::{OwnerId, SessionId};
use stash_entity::upload::{
    ClaimedSession, CreateUploadSession, UploadPart, UploadSession, UploadState,
};

use super::MemoryStore;
use crate::traits::UploadSessionRepository;

#[async_trait]
impl UploadSessionRepository for MemoryStore {
    async fn create(&self, data: &CreateUploadSession) -> AppResult<UploadSession> {
        let mut state = self.state.lock().await;
        if state.sessions.contains_key(&data.id) {
            return Err(AppError::conflict(format!(
                "Upload session {} already exists",
                data.id
            )));
        }

        let session = UploadSession {
            id: data.id,
            owner_id: data.owner_id,
            folder_id: data.folder_id,
            name: data.name.clone(),
            extension: data.extension.clone(),
            total_size: data.total_size,
            total_parts: data.total_parts,
            status: UploadState::Initiated,
            created_at: data.created_at,
            updated_at: data.created_at,
        };
        state.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id(&self, id: SessionId) -> AppResult<Option<UploadSession>> {
        Ok(self.state.lock().await.sessions.get(&id).cloned())
    }

    async fn list_parts(&self, id: SessionId) -> AppResult<Vec<UploadPart>> {
        Ok(self.state.lock().await.session_parts(id))
    }

    async fn upsert_part(
        &self,
        id: SessionId,
        part_number: i32,
        size_bytes: i64,
        at: DateTime<Utc>,
    ) -> AppResult<UploadPart> {
        let mut state = self.state.lock().await;
        let session = state
            .sessions
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Upload session {id} not found")))?;

        if !session.status.can_transition_to(UploadState::Uploading) {
            return Err(AppError::conflict(format!(
                "Upload session {id} is {}",
                session.status
            )));
        }
        session.status = UploadState::Uploading;
        session.updated_at = at;

        let part = UploadPart {
            session_id: id,
            part_number,
            size_bytes,
            uploaded_at: at,
        };
        state.parts.insert((id, part_number), part.clone());
        Ok(part)
    }

    async fn take(&self, id: SessionId) -> AppResult<Option<ClaimedSession>> {
        let mut state = self.state.lock().await;
        let Some(session) = state.sessions.remove(&id) else {
            return Ok(None);
        };

        let parts = state.session_parts(id);
        state.parts.retain(|(session_id, _), _| *session_id != id);
        Ok(Some(ClaimedSession { session, parts }))
    }

    async fn delete(&self, id: SessionId) -> AppResult<bool> {
        let mut state = self.state.lock().await;
        state.parts.retain(|(session_id, _), _| *session_id != id);
        Ok(state.sessions.remove(&id).is_some())
    }

    async fn list_created_before(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<UploadSession>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<UploadSession> = state
            .sessions
            .values()
            .filter(|s| s.created_at <= cutoff)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        Ok(sessions)
    }

    async fn list_by_owner(&self, owner: OwnerId) -> AppResult<Vec<UploadSession>> {
        let state = self.state.lock().await;
        let mut sessions: Vec<UploadSession> = state
            .sessions
            .values()
            .filter(|s| s.owner_id == owner)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }
}
