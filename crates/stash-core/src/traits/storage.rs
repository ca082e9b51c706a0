//! Storage provider trait for the blob namespace.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use crate::result::AppResult;

/// Metadata about a stored object.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct StorageObjectMeta {
    /// Key within the storage provider.
    pub path: String,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Last modified timestamp.
    pub last_modified: Option<chrono::DateTime<chrono::Utc>>,
    /// Whether this is a directory.
    pub is_directory: bool,
}

/// A byte stream type used for reading and writing object contents.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, std::io::Error>> + Send>>;

/// Trait for blob storage backends.
///
/// Keys are opaque, `/`-separated strings. The core never interprets object
/// contents. Removal of an absent object or directory is a success.
#[async_trait]
pub trait StorageProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Return the provider type name (e.g., "local").
    fn provider_type(&self) -> &str;

    /// Check whether the provider is healthy and reachable.
    async fn health_check(&self) -> AppResult<bool>;

    /// Open an object and return its byte stream.
    async fn read(&self, path: &str) -> AppResult<ByteStream>;

    /// Read an object into memory.
    async fn read_bytes(&self, path: &str) -> AppResult<Bytes>;

    /// Write bytes to an object, replacing any previous content.
    async fn write(&self, path: &str, data: Bytes) -> AppResult<()>;

    /// Write a byte stream to an object. Returns the number of bytes written.
    async fn write_stream(&self, path: &str, stream: ByteStream) -> AppResult<u64>;

    /// Remove an object.
    async fn delete(&self, path: &str) -> AppResult<()>;

    /// Remove a directory and everything under it.
    async fn delete_dir(&self, path: &str) -> AppResult<()>;

    /// Atomically move an object, replacing the destination if it exists.
    async fn rename(&self, from: &str, to: &str) -> AppResult<()>;

    /// Check whether an object or directory exists.
    async fn exists(&self, path: &str) -> AppResult<bool>;

    /// Get metadata about an object or directory.
    async fn metadata(&self, path: &str) -> AppResult<StorageObjectMeta>;

    /// List the direct children of a directory.
    async fn list(&self, path: &str) -> AppResult<Vec<StorageObjectMeta>>;

    /// Create a directory (and any missing parents).
    async fn create_dir(&self, path: &str) -> AppResult<()>;
}
