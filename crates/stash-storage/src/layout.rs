//! Key layout of the blob namespace.
//!
//! ```text
//! objects/<uuid>                      finished file contents
//! uploads/<session-id>/               working area of one upload
//! uploads/<session-id>/00001.part     slot of part 1
//! ```

use uuid::Uuid;

use stash_core::types::SessionId;

/// Prefix under which finished objects are stored.
pub const OBJECTS_PREFIX: &str = "objects";

/// Prefix under which upload working areas live.
pub const UPLOADS_PREFIX: &str = "uploads";

/// Suffix of a committed part slot.
const PART_SUFFIX: &str = ".part";

/// A fresh, never reused physical key for a finished object.
pub fn new_object_key() -> String {
    object_key(Uuid::new_v4())
}

/// Physical key of the object with the given id.
pub fn object_key(id: Uuid) -> String {
    format!("{OBJECTS_PREFIX}/{id}")
}

/// Working area of an upload session.
pub fn session_dir(session: SessionId) -> String {
    format!("{UPLOADS_PREFIX}/{session}")
}

/// Slot of a committed part.
pub fn part_key(session: SessionId, part_number: i32) -> String {
    format!("{}/{part_number:05}{PART_SUFFIX}", session_dir(session))
}

/// Unique temporary key a part is streamed into before it is committed.
pub fn staging_key(session: SessionId, part_number: i32) -> String {
    format!(
        "{}/{part_number:05}.{}.tmp",
        session_dir(session),
        Uuid::new_v4().simple()
    )
}

/// Parse the session id out of a working area key such as `uploads/<id>`.
pub fn session_from_dir(key: &str) -> Option<SessionId> {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|name| name.parse().ok())
}
