//! # stash-service
//!
//! Business logic for Stash: the quota ledger front, chunked upload
//! sessions, single-shot file operations, and the trash.

pub mod file;
pub mod locks;
pub mod quota;
pub mod trash;
pub mod upload;

#[cfg(test)]
mod testing;

pub use file::{FileService, OpenedFile, UploadFileRequest};
pub use locks::KeyedLocks;
pub use quota::QuotaService;
pub use trash::{FolderPurge, TrashService};
pub use upload::{InitUploadRequest, UploadService};
