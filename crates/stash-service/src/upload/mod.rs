//! Chunked upload sessions.

pub mod service;

pub use service::{InitUploadRequest, UploadService};
