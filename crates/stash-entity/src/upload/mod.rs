//! Chunked upload entities.

pub mod session;
pub mod state;

pub use session::{ClaimedSession, CreateUploadSession, UploadPart, UploadProgress, UploadSession};
pub use state::UploadState;
