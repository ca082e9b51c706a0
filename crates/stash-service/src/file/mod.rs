//! Whole-file uploads, reads, and hard deletes.

pub mod service;

pub use service::{FileService, OpenedFile, UploadFileRequest};
