//! Single-shot file commands.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tabled::Tabled;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use stash_core::config::AppConfig;
use stash_core::error::{AppError, ErrorKind};
use stash_core::types::{FileId, FolderId, OwnerId};
use stash_entity::file::FileRecord;
use stash_service::UploadFileRequest;

use super::{Context, confirm};
use crate::output::{self, OutputFormat};

/// Arguments for file commands
#[derive(Debug, Args)]
pub struct FilesArgs {
    /// File subcommand
    #[command(subcommand)]
    pub command: FilesCommand,
}

/// File subcommands
#[derive(Debug, Subcommand)]
pub enum FilesCommand {
    /// Upload a local file in one request
    Put {
        /// Owner ID
        owner: OwnerId,
        /// Local file to upload
        path: PathBuf,
        /// Destination folder (defaults to the root)
        #[arg(long)]
        folder: Option<FolderId>,
    },
    /// Download a live file
    Get {
        /// Owner ID
        owner: OwnerId,
        /// File ID
        file: FileId,
        /// Where to write the content
        dest: PathBuf,
    },
    /// Delete a file immediately, bypassing the trash
    Rm {
        /// Owner ID
        owner: OwnerId,
        /// File ID
        file: FileId,
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// A file as printed by the CLI.
#[derive(Debug, Serialize, Tabled)]
pub struct FileRow {
    /// File ID
    #[tabled(rename = "ID")]
    pub id: String,
    /// Display name
    #[tabled(rename = "Name")]
    pub name: String,
    /// Size
    #[tabled(rename = "Size")]
    pub size: String,
    /// Creation time
    #[tabled(rename = "Created At")]
    pub created_at: String,
}

impl From<&FileRecord> for FileRow {
    fn from(file: &FileRecord) -> Self {
        Self {
            id: file.id.to_string(),
            name: file.display_name(),
            size: output::human_bytes(file.size_bytes),
            created_at: file.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// Split a local path into the stored name and extension.
fn split_name(path: &Path) -> Result<(String, String), AppError> {
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AppError::validation(format!("Invalid file name: {}", path.display())))?;
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    Ok((name.to_string(), extension.to_string()))
}

fn io_error(action: &str, path: &Path, e: std::io::Error) -> AppError {
    AppError::with_source(
        ErrorKind::Storage,
        format!("Failed to {action} {}", path.display()),
        e,
    )
}

/// Execute file commands
pub async fn execute(
    args: &FilesArgs,
    config: &AppConfig,
    format: OutputFormat,
) -> Result<(), AppError> {
    let ctx = Context::connect(config).await?;

    match &args.command {
        FilesCommand::Put {
            owner,
            path,
            folder,
        } => {
            let (name, extension) = split_name(path)?;
            let local = tokio::fs::File::open(path)
                .await
                .map_err(|e| io_error("open", path, e))?;
            let size = local
                .metadata()
                .await
                .map_err(|e| io_error("inspect", path, e))?
                .len();

            let file = ctx
                .files
                .upload_file(
                    UploadFileRequest {
                        owner_id: *owner,
                        folder_id: *folder,
                        name,
                        extension,
                        size_bytes: size as i64,
                    },
                    Box::pin(ReaderStream::new(local)),
                )
                .await?;
            output::print_item(&FileRow::from(&file), format);
        }
        FilesCommand::Get { owner, file, dest } => {
            let mut opened = ctx.files.open_file(*owner, *file).await?;
            let mut out = tokio::fs::File::create(dest)
                .await
                .map_err(|e| io_error("create", dest, e))?;
            while let Some(chunk) = opened.body.next().await {
                let chunk = chunk.map_err(|e| io_error("read content for", dest, e))?;
                out.write_all(&chunk)
                    .await
                    .map_err(|e| io_error("write", dest, e))?;
            }
            out.flush().await.map_err(|e| io_error("write", dest, e))?;
            output::print_success(&format!(
                "Wrote {} to {}",
                opened.file.display_name(),
                dest.display()
            ));
        }
        FilesCommand::Rm {
            owner,
            file,
            force,
        } => {
            if !confirm(&format!("Delete file {file} permanently?"), *force)? {
                output::print_warning("Aborted");
                return Ok(());
            }
            let removed = ctx.files.delete_file(*owner, *file).await?;
            output::print_success(&format!(
                "Deleted {} ({} freed)",
                removed.display_name(),
                output::human_bytes(removed.size_bytes)
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        let (name, ext) = split_name(Path::new("/tmp/report.final.pdf")).unwrap();
        assert_eq!(name, "report.final");
        assert_eq!(ext, "pdf");

        let (name, ext) = split_name(Path::new("Makefile")).unwrap();
        assert_eq!(name, "Makefile");
        assert_eq!(ext, "");
    }
}
