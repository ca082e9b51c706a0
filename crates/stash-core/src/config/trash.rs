//! Trash retention configuration.

use serde::{Deserialize, Serialize};

/// Trash settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashConfig {
    /// Days a trashed item is kept before the purge sweep removes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl TrashConfig {
    /// Retention window as a chrono duration.
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl Default for TrashConfig {
    fn default() -> Self {
        Self {
            retention_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    30
}
