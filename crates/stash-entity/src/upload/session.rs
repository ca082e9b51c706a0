//! Upload session and part entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use stash_core::types::{FolderId, OwnerId, SessionId};

use super::state::UploadState;

/// A chunked upload in progress. Holds a quota reservation of `total_size`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UploadSession {
    /// Session identifier, also the name of the working area.
    pub id: SessionId,
    /// The uploading account.
    pub owner_id: OwnerId,
    /// Destination folder for the finished file (None = root).
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// File extension without the leading dot (may be empty).
    pub extension: String,
    /// Declared total size in bytes; the amount reserved.
    pub total_size: i64,
    /// Number of parts; part numbers run `1..=total_parts`.
    pub total_parts: i32,
    /// Current state.
    pub status: UploadState,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When a part was last accepted.
    pub updated_at: DateTime<Utc>,
}

impl UploadSession {
    /// Whether `part_number` is inside this session's range.
    pub fn accepts_part(&self, part_number: i32) -> bool {
        (1..=self.total_parts).contains(&part_number)
    }

    /// Part numbers in `1..=total_parts` missing from `parts`.
    pub fn missing_parts(&self, parts: &[UploadPart]) -> Vec<i32> {
        (1..=self.total_parts)
            .filter(|n| !parts.iter().any(|p| p.part_number == *n))
            .collect()
    }
}

/// Data required to create a new upload session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUploadSession {
    /// Pre-allocated session identifier.
    pub id: SessionId,
    /// The uploading account.
    pub owner_id: OwnerId,
    /// Destination folder.
    pub folder_id: Option<FolderId>,
    /// File name without extension.
    pub name: String,
    /// File extension.
    pub extension: String,
    /// Declared total size in bytes.
    pub total_size: i64,
    /// Number of parts.
    pub total_parts: i32,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Recorded metadata of one uploaded part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct UploadPart {
    /// Owning session.
    pub session_id: SessionId,
    /// 1-based part number.
    pub part_number: i32,
    /// Size of the most recent accepted write.
    pub size_bytes: i64,
    /// When the most recent write was accepted.
    pub uploaded_at: DateTime<Utc>,
}

/// A session row removed together with its parts in one atomic step.
///
/// Whoever obtains the claim owns the session's terminal transition.
#[derive(Debug, Clone)]
pub struct ClaimedSession {
    /// The removed session row.
    pub session: UploadSession,
    /// Its part rows, ordered by part number.
    pub parts: Vec<UploadPart>,
}

/// Approximate progress of an upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Session identifier.
    pub session_id: SessionId,
    /// Sum of recorded part sizes.
    pub uploaded_bytes: i64,
    /// Number of distinct parts recorded.
    pub uploaded_parts: i32,
    /// Number of parts expected.
    pub total_parts: i32,
    /// Declared total size.
    pub total_size: i64,
    /// Current state.
    pub state: UploadState,
}

impl UploadProgress {
    /// Build progress from a session and its recorded parts.
    pub fn from_parts(session: &UploadSession, parts: &[UploadPart]) -> Self {
        Self {
            session_id: session.id,
            uploaded_bytes: parts.iter().map(|p| p.size_bytes).sum(),
            uploaded_parts: parts.len() as i32,
            total_parts: session.total_parts,
            total_size: session.total_size,
            state: session.status,
        }
    }
}
