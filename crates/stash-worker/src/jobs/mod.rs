//! Purge job implementations.

pub mod trash;
pub mod uploads;

pub use trash::TrashPurgeJob;
pub use uploads::UploadPurgeJob;

use serde::{Deserialize, Serialize};

/// Counts reported by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeReport {
    /// Items removed.
    pub purged: usize,
    /// Items left alone because they changed or were already gone.
    pub skipped: usize,
    /// Items whose removal failed; retried on the next sweep.
    pub failed: usize,
    /// Orphaned upload working areas removed.
    pub orphans_removed: u64,
}

impl PurgeReport {
    /// Add the counts of another sweep.
    pub fn merge(&mut self, other: PurgeReport) {
        self.purged += other.purged;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.orphans_removed += other.orphans_removed;
    }
}
