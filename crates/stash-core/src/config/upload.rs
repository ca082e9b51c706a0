//! Upload session configuration.

use serde::{Deserialize, Serialize};

/// Upload session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hours after creation at which an unfinished session is reclaimed.
    #[serde(default = "default_staleness_hours")]
    pub staleness_hours: u32,
}

impl UploadConfig {
    /// Staleness window as a chrono duration.
    pub fn staleness(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.staleness_hours))
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            staleness_hours: default_staleness_hours(),
        }
    }
}

fn default_staleness_hours() -> u32 {
    24 * 7
}
