//! Fault-injecting storage for tests of code built on [`StorageProvider`].

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Notify;

use stash_core::error::AppError;
use stash_core::result::AppResult;
use stash_core::traits::storage::{ByteStream, StorageObjectMeta, StorageProvider};

use crate::providers::LocalStorageProvider;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A paused removal of, or rename onto, one key.
#[derive(Debug, Default)]
pub struct Hold {
    reached: Notify,
    resumed: Notify,
}

impl Hold {
    /// Wait until the paused operation has been reached.
    pub async fn reached(&self) {
        self.reached.notified().await;
    }

    /// Let the paused operation continue.
    pub fn resume(&self) {
        self.resumed.notify_one();
    }
}

/// Local storage that fails or pauses chosen operations on demand.
#[derive(Debug)]
pub struct FaultyStorage {
    inner: LocalStorageProvider,
    write_prefixes: Mutex<Vec<String>>,
    delete_keys: Mutex<HashSet<String>>,
    holds: Mutex<HashMap<String, Arc<Hold>>>,
}

impl FaultyStorage {
    /// Wrap a local provider rooted at `root`.
    pub async fn new(root: &str) -> AppResult<Self> {
        Ok(Self {
            inner: LocalStorageProvider::new(root).await?,
            write_prefixes: Mutex::new(Vec::new()),
            delete_keys: Mutex::new(HashSet::new()),
            holds: Mutex::new(HashMap::new()),
        })
    }

    /// Fail every write, stream write or rename targeting a key under `prefix`.
    pub fn fail_writes_under(&self, prefix: &str) {
        guard(&self.write_prefixes).push(prefix.to_string());
    }

    /// Fail every removal of `key`.
    pub fn fail_delete(&self, key: &str) {
        guard(&self.delete_keys).insert(key.to_string());
    }

    /// Pause the next removal of, or rename onto, `key` until resumed.
    pub fn hold(&self, key: &str) -> Arc<Hold> {
        let hold = Arc::new(Hold::default());
        guard(&self.holds).insert(key.to_string(), hold.clone());
        hold
    }

    /// Stop injecting failures.
    pub fn heal(&self) {
        guard(&self.write_prefixes).clear();
        guard(&self.delete_keys).clear();
    }

    fn check_write(&self, path: &str) -> AppResult<()> {
        if guard(&self.write_prefixes)
            .iter()
            .any(|p| path.starts_with(p.as_str()))
        {
            return Err(AppError::storage(format!("Injected write failure: {path}")));
        }
        Ok(())
    }

    async fn pause_at(&self, key: &str) {
        let hold = guard(&self.holds).remove(key);
        if let Some(hold) = hold {
            hold.reached.notify_one();
            hold.resumed.notified().await;
        }
    }
}

#[async_trait]
impl StorageProvider for FaultyStorage {
    fn provider_type(&self) -> &str {
        "faulty"
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.inner.health_check().await
    }

    async fn read(&self, path: &str) -> AppResult<ByteStream> {
        self.inner.read(path).await
    }

    async fn read_bytes(&self, path: &str) -> AppResult<Bytes> {
        self.inner.read_bytes(path).await
    }

    async fn write(&self, path: &str, data: Bytes) -> AppResult<()> {
        self.check_write(path)?;
        self.inner.write(path, data).await
    }

    async fn write_stream(&self, path: &str, stream: ByteStream) -> AppResult<u64> {
        self.check_write(path)?;
        self.inner.write_stream(path, stream).await
    }

    async fn delete(&self, path: &str) -> AppResult<()> {
        if guard(&self.delete_keys).contains(path) {
            return Err(AppError::storage(format!("Injected delete failure: {path}")));
        }
        self.pause_at(path).await;
        self.inner.delete(path).await
    }

    async fn delete_dir(&self, path: &str) -> AppResult<()> {
        self.inner.delete_dir(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> AppResult<()> {
        self.check_write(to)?;
        self.pause_at(to).await;
        self.inner.rename(from, to).await
    }

    async fn exists(&self, path: &str) -> AppResult<bool> {
        self.inner.exists(path).await
    }

    async fn metadata(&self, path: &str) -> AppResult<StorageObjectMeta> {
        self.inner.metadata(path).await
    }

    async fn list(&self, path: &str) -> AppResult<Vec<StorageObjectMeta>> {
        self.inner.list(path).await
    }

    async fn create_dir(&self, path: &str) -> AppResult<()> {
        self.inner.create_dir(path).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_hold_pauses_one_delete() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(FaultyStorage::new(dir.path().to_str().unwrap()).await.unwrap());
        storage.write("objects/a", Bytes::from_static(b"a")).await.unwrap();

        let hold = storage.hold("objects/a");
        let delete = {
            let storage = storage.clone();
            tokio::spawn(async move { storage.delete("objects/a").await })
        };
        hold.reached().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!delete.is_finished());
        assert!(storage.exists("objects/a").await.unwrap());

        hold.resume();
        delete.await.unwrap().unwrap();
        assert!(!storage.exists("objects/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_failures_until_healed() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FaultyStorage::new(dir.path().to_str().unwrap()).await.unwrap();
        storage.write("objects/a", Bytes::from_static(b"a")).await.unwrap();
        storage.fail_writes_under("objects/");
        storage.fail_delete("objects/a");

        assert!(storage.write("objects/b", Bytes::new()).await.is_err());
        assert!(storage.delete("objects/a").await.is_err());

        storage.heal();
        storage.write("objects/b", Bytes::new()).await.unwrap();
        storage.delete("objects/a").await.unwrap();
    }
}
