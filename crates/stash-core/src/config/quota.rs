//! Quota configuration.

use serde::{Deserialize, Serialize};

/// Per-account quota defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Limit assigned to newly opened accounts (default 10 GB).
    #[serde(default = "default_limit")]
    pub default_limit_bytes: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            default_limit_bytes: default_limit(),
        }
    }
}

fn default_limit() -> i64 {
    10_737_418_240 // 10 GB
}
