//! One-shot purge commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use stash_core::config::AppConfig;
use stash_core::error::AppError;
use stash_worker::{PurgeReport, TrashPurgeJob, UploadPurgeJob};

use super::{Context, confirm};
use crate::output::{self, OutputFormat};

/// Arguments for purge commands
#[derive(Debug, Args)]
pub struct PurgeArgs {
    /// Purge subcommand
    #[command(subcommand)]
    pub command: PurgeCommand,

    /// Skip confirmation prompt
    #[arg(long, global = true)]
    pub force: bool,
}

/// Purge subcommands
#[derive(Debug, Subcommand)]
pub enum PurgeCommand {
    /// Permanently delete trash older than the retention window
    Trash {
        /// Override trash.retention_days
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Reclaim upload sessions older than the staleness window
    Uploads {
        /// Override upload.staleness_hours
        #[arg(long)]
        staleness_hours: Option<u32>,
    },
    /// Run both sweeps with the configured windows
    All,
}

/// A sweep result as printed by the CLI.
#[derive(Debug, Serialize, Tabled)]
pub struct ReportRow {
    /// Which sweep
    #[tabled(rename = "Sweep")]
    pub sweep: &'static str,
    /// Items removed
    #[tabled(rename = "Purged")]
    pub purged: usize,
    /// Items left alone
    #[tabled(rename = "Skipped")]
    pub skipped: usize,
    /// Items that failed
    #[tabled(rename = "Failed")]
    pub failed: usize,
    /// Orphaned working areas removed
    #[tabled(rename = "Orphans")]
    pub orphans_removed: u64,
}

impl ReportRow {
    fn new(sweep: &'static str, report: PurgeReport) -> Self {
        Self {
            sweep,
            purged: report.purged,
            skipped: report.skipped,
            failed: report.failed,
            orphans_removed: report.orphans_removed,
        }
    }
}

/// Execute purge commands
pub async fn execute(
    args: &PurgeArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let (retention, staleness) = match &args.command {
        PurgeCommand::Trash { retention_days } => (
            Some(retention_days.map_or_else(
                || config.trash.retention(),
                |d| chrono::Duration::days(i64::from(d)),
            )),
            None,
        ),
        PurgeCommand::Uploads { staleness_hours } => (
            None,
            Some(staleness_hours.map_or_else(
                || config.upload.staleness(),
                |h| chrono::Duration::hours(i64::from(h)),
            )),
        ),
        PurgeCommand::All => (
            Some(config.trash.retention()),
            Some(config.upload.staleness()),
        ),
    };

    if !confirm("This permanently deletes data. Continue?", args.force)? {
        println!("Cancelled.");
        return Ok(());
    }

    let ctx = Context::connect(config).await?;
    let mut rows = Vec::new();

    if let Some(retention) = retention {
        let job = TrashPurgeJob::new(ctx.trash.clone(), ctx.clock.clone());
        rows.push(ReportRow::new("trash", job.run(retention).await?));
    }
    if let Some(staleness) = staleness {
        let job = UploadPurgeJob::new(ctx.uploads.clone(), ctx.clock.clone());
        rows.push(ReportRow::new("uploads", job.run(staleness).await?));
    }

    output::print_list(&rows, format);
    if rows.iter().any(|r| r.failed > 0) {
        output::print_warning("Some items could not be purged; see the log for details.");
    }
    Ok(())
}
