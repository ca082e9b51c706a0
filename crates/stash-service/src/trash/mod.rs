//! Soft delete, restore, and permanent removal of files and folders.

pub mod service;

pub use service::{FolderPurge, TrashService};
