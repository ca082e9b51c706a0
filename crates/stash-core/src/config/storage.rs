//! Blob storage configuration.

use serde::{Deserialize, Serialize};

/// Top-level storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for stored objects and upload working areas.
    #[serde(default = "default_data_root")]
    pub data_root: String,
    /// Maximum declared size of a single upload in bytes (default 5 GB).
    #[serde(default = "default_max_upload")]
    pub max_upload_size_bytes: i64,
    /// Maximum number of parts a single upload may declare.
    #[serde(default = "default_max_parts")]
    pub max_parts: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_root: default_data_root(),
            max_upload_size_bytes: default_max_upload(),
            max_parts: default_max_parts(),
        }
    }
}

fn default_data_root() -> String {
    "./data/storage".to_string()
}

fn default_max_upload() -> i64 {
    5_368_709_120 // 5 GB
}

fn default_max_parts() -> i32 {
    10_000
}
