//! Database migration management commands.

use clap::{Args, Subcommand};

use stash_core::config::{AppConfig, DatabaseProvider};
use stash_core::error::AppError;
use stash_database::DatabasePool;

use crate::output;

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Check that the database is reachable
    Check,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> Result<(), AppError> {
    if config.database.provider != DatabaseProvider::Postgres {
        output::print_warning("database.provider is not \"postgres\"; nothing to migrate.");
        return Ok(());
    }

    let db = DatabasePool::connect(&config.database).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            stash_database::migration::run_migrations(db.pool()).await?;
            output::print_success("All migrations applied successfully.");
        }
        MigrateCommand::Check => {
            if db.health_check().await? {
                output::print_success("Database is reachable.");
            } else {
                output::print_warning("Database did not answer the health check.");
            }
        }
    }

    db.close().await;
    Ok(())
}
