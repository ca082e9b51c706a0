//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every section has defaults, so an empty configuration yields
//! a runnable in-memory setup.

pub mod database;
pub mod logging;
pub mod quota;
pub mod storage;
pub mod trash;
pub mod upload;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::database::{DatabaseConfig, DatabaseProvider};
pub use self::logging::LoggingConfig;
pub use self::quota::QuotaConfig;
pub use self::storage::StorageConfig;
pub use self::trash::TrashConfig;
pub use self::upload::UploadConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Environment variable prefix, e.g. `STASH__DATABASE__URL`.
pub const ENV_PREFIX: &str = "STASH";

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (base file + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Metadata store settings.
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Blob storage settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Quota defaults.
    #[serde(default)]
    pub quota: QuotaConfig,
    /// Trash retention settings.
    #[serde(default)]
    pub trash: TrashConfig,
    /// Upload session settings.
    #[serde(default)]
    pub upload: UploadConfig,
    /// Background purge settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the base file with an optional `<env>.toml` overlay that sits
    /// next to it, then with environment variables prefixed with `STASH__`.
    pub fn load(base_path: &str, env: Option<&str>) -> Result<Self, AppError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name(base_path).required(false));

        if let Some(env) = env {
            let dir = Path::new(base_path)
                .parent()
                .unwrap_or_else(|| Path::new("."));
            let overlay = dir.join(env);
            builder = builder.add_source(
                config::File::with_name(&overlay.to_string_lossy()).required(false),
            );
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject combinations the services cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.database.provider == DatabaseProvider::Postgres && self.database.url.is_empty() {
            return Err(AppError::configuration(
                "database.url is required when database.provider = \"postgres\"",
            ));
        }
        if self.quota.default_limit_bytes < 0 {
            return Err(AppError::configuration(
                "quota.default_limit_bytes must not be negative",
            ));
        }
        if self.trash.retention_days == 0 {
            return Err(AppError::configuration(
                "trash.retention_days must be at least 1",
            ));
        }
        if self.upload.staleness_hours == 0 {
            return Err(AppError::configuration(
                "upload.staleness_hours must be at least 1",
            ));
        }
        if self.worker.trash_purge_interval_seconds == 0
            || self.worker.upload_purge_interval_seconds == 0
        {
            return Err(AppError::configuration(
                "worker purge intervals must be at least 1 second",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.database.provider, DatabaseProvider::Memory);
        assert_eq!(config.trash.retention_days, 30);
        assert_eq!(config.upload.staleness_hours, 24 * 7);
        config.validate().expect("defaults should validate");
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = AppConfig::default();
        config.database.provider = DatabaseProvider::Postgres;
        let err = config.validate().expect_err("missing url");
        assert_eq!(err.kind, crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_load_missing_files_uses_defaults() {
        let config = AppConfig::load("does/not/exist/default", Some("test"))
            .expect("absent files are optional");
        assert_eq!(config.worker.trash_purge_interval_seconds, 3600);
    }
}
