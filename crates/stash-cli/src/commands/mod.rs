//! CLI command definitions and dispatch.

pub mod files;
pub mod migrate;
pub mod purge;
pub mod quota;
pub mod trash;

use std::sync::Arc;

use clap::{Parser, Subcommand};

use stash_core::config::{AppConfig, DatabaseProvider};
use stash_core::error::AppError;
use stash_core::traits::{Clock, StorageProvider, SystemClock};
use stash_database::Repositories;
use stash_service::{FileService, QuotaService, TrashService, UploadService};
use stash_storage::LocalStorageProvider;

use crate::output::{self, OutputFormat};

/// Stash — upload and storage-lifecycle administration
#[derive(Debug, Parser)]
#[command(name = "stash", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Environment overlay to merge on top of the configuration file
    /// (defaults to $STASH_ENV)
    #[arg(short, long)]
    pub env: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Storage quota management
    Quota(quota::QuotaArgs),
    /// Trash inspection
    Trash(trash::TrashArgs),
    /// Single-shot file upload, download, and deletion
    Files(files::FilesArgs),
    /// One-shot purge sweeps
    Purge(purge::PurgeArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> Result<(), AppError> {
        let env = self.env.clone().or_else(|| std::env::var("STASH_ENV").ok());
        let config = AppConfig::load(&self.config, env.as_deref())?;

        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Quota(args) => quota::execute(args, &config, self.format).await,
            Commands::Trash(args) => trash::execute(args, &config, self.format).await,
            Commands::Files(args) => files::execute(args, &config, self.format).await,
            Commands::Purge(args) => purge::execute(args, &config, self.format).await,
        }
    }
}

/// Services wired the same way the server wires them.
pub struct Context {
    pub clock: Arc<dyn Clock>,
    pub quota: Arc<QuotaService>,
    pub uploads: UploadService,
    pub files: FileService,
    pub trash: TrashService,
}

impl Context {
    /// Connect to the configured stores and build the services.
    pub async fn connect(config: &AppConfig) -> Result<Self, AppError> {
        if config.database.provider == DatabaseProvider::Memory {
            output::print_warning(
                "database.provider = \"memory\": this command sees an empty store",
            );
        }

        let repos = Repositories::connect(&config.database).await?;
        let provider: Arc<dyn StorageProvider> =
            Arc::new(LocalStorageProvider::new(&config.storage.data_root).await?);
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let quota = Arc::new(QuotaService::new(
            repos.quota.clone(),
            repos.files.clone(),
            repos.sessions.clone(),
            config.quota.clone(),
        ));
        let uploads = UploadService::new(
            repos.sessions.clone(),
            repos.files.clone(),
            repos.folders.clone(),
            Arc::clone(&quota),
            Arc::clone(&provider),
            Arc::clone(&clock),
            config.storage.clone(),
        );
        let files = FileService::new(
            repos.files.clone(),
            repos.folders.clone(),
            Arc::clone(&quota),
            Arc::clone(&provider),
            repos.locks.clone(),
            Arc::clone(&clock),
            config.storage.clone(),
        );
        let trash = TrashService::new(
            repos.files.clone(),
            repos.folders.clone(),
            Arc::clone(&quota),
            provider,
            repos.locks.clone(),
            Arc::clone(&clock),
        );

        Ok(Self {
            clock,
            quota,
            uploads,
            files,
            trash,
        })
    }
}

/// Ask before a destructive action unless `force` is set.
pub fn confirm(prompt: &str, force: bool) -> Result<bool, AppError> {
    if force {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| AppError::internal(format!("Input error: {}", e)))
}
