//! Stash Server — upload and storage-lifecycle core.
//!
//! Wires configuration, metadata store, storage, services and the purge
//! scheduler together, then runs until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use stash_core::config::AppConfig;
use stash_core::error::AppError;
use stash_core::traits::{Clock, StorageProvider, SystemClock};
use stash_database::Repositories;
use stash_service::{QuotaService, TrashService, UploadService};
use stash_storage::LocalStorageProvider;
use stash_worker::{PurgeScheduler, TrashPurgeJob, UploadPurgeJob};

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("STASH_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("STASH_ENV").ok();

    AppConfig::load(&config_path, env.as_deref())
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting Stash v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Metadata store ───────────────────────────────────
    tracing::info!(
        "Connecting metadata store (provider: {:?})...",
        config.database.provider
    );
    let repos = Repositories::connect(&config.database).await?;

    // ── Step 2: Storage ──────────────────────────────────────────
    tracing::info!("Initializing storage at '{}'...", config.storage.data_root);
    let provider: Arc<dyn StorageProvider> =
        Arc::new(LocalStorageProvider::new(&config.storage.data_root).await?);
    if !provider.health_check().await? {
        return Err(AppError::storage("Storage root is not writable"));
    }

    // ── Step 3: Services ─────────────────────────────────────────
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
    let trash = TrashService::new(
        repos.files.clone(),
        repos.folders.clone(),
        Arc::clone(&quota),
        Arc::clone(&provider),
        repos.locks.clone(),
        Arc::clone(&clock),
    );
    tracing::info!("Services initialized");

    // ── Step 4: Purge scheduler ──────────────────────────────────
    let mut scheduler = PurgeScheduler::new(
        TrashPurgeJob::new(trash, Arc::clone(&clock)),
        UploadPurgeJob::new(uploads, Arc::clone(&clock)),
        config.worker.clone(),
        &config.trash,
        &config.upload,
    )
    .await?;
    scheduler.start().await?;

    tracing::info!("Stash is running, press Ctrl+C to stop");

    // ── Step 5: Graceful shutdown ────────────────────────────────
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping background tasks...");

    scheduler.shutdown().await?;

    tracing::info!("Stash shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
