//! Upload session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a chunked upload session.
///
/// Only `Initiated` and `Uploading` are ever persisted. Reaching a terminal
/// state removes the session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "upload_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    /// Quota reserved, no part received yet.
    Initiated,
    /// At least one part has been accepted.
    Uploading,
    /// Parts were assembled into a file.
    Completed,
    /// Cancelled by the owner.
    Aborted,
    /// Reclaimed by the staleness sweep.
    Purged,
}

impl UploadState {
    /// Whether the session is finished and no longer exists.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted | Self::Purged)
    }

    /// Whether a transition from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: UploadState) -> bool {
        match (self, next) {
            (Self::Initiated, Self::Uploading) => true,
            (Self::Uploading, Self::Uploading) => true,
            (Self::Initiated | Self::Uploading, next) => next.is_terminal(),
            _ => false,
        }
    }

    /// Return the state as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initiated => "initiated",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Purged => "purged",
        }
    }
}

impl fmt::Display for UploadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        assert!(UploadState::Initiated.can_transition_to(UploadState::Uploading));
        assert!(UploadState::Initiated.can_transition_to(UploadState::Aborted));
        assert!(UploadState::Uploading.can_transition_to(UploadState::Completed));
        assert!(UploadState::Uploading.can_transition_to(UploadState::Purged));
        assert!(!UploadState::Uploading.can_transition_to(UploadState::Initiated));
        assert!(!UploadState::Completed.can_transition_to(UploadState::Aborted));
        assert!(!UploadState::Aborted.can_transition_to(UploadState::Uploading));
    }
}
