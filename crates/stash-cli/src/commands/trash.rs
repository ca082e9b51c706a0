//! Trash inspection commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use stash_core::config::AppConfig;
use stash_core::error::AppError;
use stash_core::types::OwnerId;
use stash_entity::file::FileRecord;
use stash_entity::folder::FolderRecord;

use super::Context;
use crate::output::{self, OutputFormat};

/// Arguments for trash commands
#[derive(Debug, Args)]
pub struct TrashArgs {
    /// Trash subcommand
    #[command(subcommand)]
    pub command: TrashCommand,
}

/// Trash subcommands
#[derive(Debug, Subcommand)]
pub enum TrashCommand {
    /// List an owner's trashed folders and files
    List {
        /// Owner ID
        owner: OwnerId,
    },
}

/// A trashed item as printed by the CLI.
#[derive(Debug, Serialize, Tabled)]
pub struct TrashRow {
    /// "folder" or "file"
    #[tabled(rename = "Kind")]
    pub kind: &'static str,
    /// Item ID
    #[tabled(rename = "ID")]
    pub id: String,
    /// Display name
    #[tabled(rename = "Name")]
    pub name: String,
    /// Size (files only)
    #[tabled(rename = "Size")]
    pub size: String,
    /// When the item was trashed
    #[tabled(rename = "Trashed At")]
    pub deleted_at: String,
}

fn trashed_at(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

impl From<&FolderRecord> for TrashRow {
    fn from(folder: &FolderRecord) -> Self {
        Self {
            kind: "folder",
            id: folder.id.to_string(),
            name: folder.name.clone(),
            size: String::new(),
            deleted_at: trashed_at(folder.deleted_at),
        }
    }
}

impl From<&FileRecord> for TrashRow {
    fn from(file: &FileRecord) -> Self {
        Self {
            kind: "file",
            id: file.id.to_string(),
            name: file.display_name(),
            size: output::human_bytes(file.size_bytes),
            deleted_at: trashed_at(file.deleted_at),
        }
    }
}

/// Execute trash commands
pub async fn execute(
    args: &TrashArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let ctx = Context::connect(config).await?;

    match &args.command {
        TrashCommand::List { owner } => {
            let folders = ctx.trash.list_trashed_folders(*owner).await?;
            let files = ctx.trash.list_trashed_files(*owner).await?;

            let rows: Vec<TrashRow> = folders
                .iter()
                .map(TrashRow::from)
                .chain(files.iter().map(TrashRow::from))
                .collect();
            output::print_list(&rows, format);
        }
    }

    Ok(())
}
