//! Storage quota commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use stash_core::config::AppConfig;
use stash_core::error::AppError;
use stash_core::types::OwnerId;
use stash_entity::account::StorageAccount;

use super::Context;
use crate::output::{self, OutputFormat};

/// Arguments for quota commands
#[derive(Debug, Args)]
pub struct QuotaArgs {
    /// Quota subcommand
    #[command(subcommand)]
    pub command: QuotaCommand,
}

/// Quota subcommands
#[derive(Debug, Subcommand)]
pub enum QuotaCommand {
    /// Show an owner's usage and limit
    Show {
        /// Owner ID
        owner: OwnerId,
    },
    /// Open a storage account
    Open {
        /// Owner ID
        owner: OwnerId,
        /// Limit in bytes (defaults to quota.default_limit_bytes)
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Change an owner's limit
    SetLimit {
        /// Owner ID
        owner: OwnerId,
        /// New limit in bytes
        limit: i64,
    },
    /// Overwrite an owner's recorded usage
    SetUsed {
        /// Owner ID
        owner: OwnerId,
        /// Usage in bytes
        used: i64,
    },
    /// Recompute usage from files and open upload sessions
    Reconcile {
        /// Owner ID
        owner: OwnerId,
    },
}

/// An account as printed by the CLI.
#[derive(Debug, Serialize, Tabled)]
pub struct AccountRow {
    /// Owner ID
    #[tabled(rename = "Owner")]
    pub owner_id: String,
    /// Limit
    #[tabled(rename = "Limit")]
    pub limit: String,
    /// Used
    #[tabled(rename = "Used")]
    pub used: String,
    /// Available
    #[tabled(rename = "Available")]
    pub available: String,
    /// Usage percent
    #[tabled(rename = "Usage")]
    pub usage: String,
    /// Raw byte counts for scripts
    #[tabled(skip)]
    pub limit_bytes: i64,
    /// Raw byte counts for scripts
    #[tabled(skip)]
    pub used_bytes: i64,
}

impl From<&StorageAccount> for AccountRow {
    fn from(account: &StorageAccount) -> Self {
        Self {
            owner_id: account.owner_id.to_string(),
            limit: output::human_bytes(account.limit_bytes),
            used: output::human_bytes(account.used_bytes),
            available: output::human_bytes(account.available_bytes()),
            usage: format!("{:.1}%", account.usage_percent()),
            limit_bytes: account.limit_bytes,
            used_bytes: account.used_bytes,
        }
    }
}

/// Execute quota commands
pub async fn execute(
    args: &QuotaArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let ctx = Context::connect(config).await?;
    let quota = &ctx.quota;

    let account = match &args.command {
        QuotaCommand::Show { owner } => quota.account(*owner).await?,
        QuotaCommand::Open { owner, limit } => {
            let account = quota.open_account(*owner, *limit).await?;
            output::print_success(&format!("Opened storage account for {}", owner));
            account
        }
        QuotaCommand::SetLimit { owner, limit } => {
            let account = quota.set_limit(*owner, *limit).await?;
            output::print_success(&format!("Limit of {} set to {} bytes", owner, limit));
            account
        }
        QuotaCommand::SetUsed { owner, used } => {
            let account = quota.set_used(*owner, *used).await?;
            output::print_success(&format!("Usage of {} set to {} bytes", owner, used));
            account
        }
        QuotaCommand::Reconcile { owner } => {
            let before = quota.account(*owner).await?.used_bytes;
            let account = quota.reconcile(*owner).await?;
            output::print_success(&format!(
                "Usage of {} reconciled: {} -> {} bytes",
                owner, before, account.used_bytes
            ));
            account
        }
    };

    output::print_item(&AccountRow::from(&account), format);
    Ok(())
}
