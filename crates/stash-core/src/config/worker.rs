//! Background worker configuration.

use serde::{Deserialize, Serialize};

/// Background purge scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Whether the scheduler is started with the server.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between trash purge sweeps.
    #[serde(default = "default_interval")]
    pub trash_purge_interval_seconds: u64,
    /// Seconds between stale upload sweeps.
    #[serde(default = "default_interval")]
    pub upload_purge_interval_seconds: u64,
    /// Run both sweeps once immediately after start.
    #[serde(default)]
    pub run_on_start: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trash_purge_interval_seconds: default_interval(),
            upload_purge_interval_seconds: default_interval(),
            run_on_start: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval() -> u64 {
    3600
}
