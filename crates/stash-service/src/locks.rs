//! Process-local keyed locks.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{
    Mutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

/// A table of async locks, one per key, created on first use.
///
/// Serializes work within one process only. `L` is `Mutex<()>` for
/// exclusive locks or `RwLock<()>` for shared/exclusive pairs.
#[derive(Debug)]
pub struct KeyedLocks<K, L = Mutex<()>>
where
    K: Eq + Hash,
{
    locks: DashMap<K, Arc<L>>,
}

impl<K, L> KeyedLocks<K, L>
where
    K: Eq + Hash + Clone,
    L: Default,
{
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    fn entry(&self, key: K) -> Arc<L> {
        self.locks.entry(key).or_default().clone()
    }

    /// Drop the entries selected by `forget` that nobody holds or waits on.
    pub fn forget_where(&self, forget: impl Fn(&K) -> bool) {
        self.locks
            .retain(|key, lock| !(forget(key) && Arc::strong_count(lock) == 1));
    }

    /// Number of keys with a lock entry.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> KeyedLocks<K, Mutex<()>>
where
    K: Eq + Hash + Clone,
{
    /// Wait for the lock of `key`. The lock is held until the guard drops.
    pub async fn lock(&self, key: K) -> OwnedMutexGuard<()> {
        self.entry(key).lock_owned().await
    }
}

impl<K> KeyedLocks<K, RwLock<()>>
where
    K: Eq + Hash + Clone,
{
    /// Wait for a shared hold on `key`.
    pub async fn read(&self, key: K) -> OwnedRwLockReadGuard<()> {
        self.entry(key).read_owned().await
    }

    /// Wait for the exclusive hold on `key`.
    pub async fn write(&self, key: K) -> OwnedRwLockWriteGuard<()> {
        self.entry(key).write_owned().await
    }
}

impl<K, L> Default for KeyedLocks<K, L>
where
    K: Eq + Hash + Clone,
    L: Default,
{
    fn default() -> Self {
        Self::new()
    }
}
