//! # stash-storage
//!
//! Blob storage for Stash: the local filesystem provider, the key layout of
//! the blob namespace, upload working areas, part assembly, and orphan
//! working-area cleanup.

pub mod cleanup;
pub mod layout;
pub mod parts;
pub mod providers;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cleanup::OrphanAreaCleanup;
pub use parts::{PartAssembler, PartStore, StagedPart};
pub use providers::LocalStorageProvider;
