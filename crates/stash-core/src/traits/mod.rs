//! Core traits defined in `stash-core` and implemented by other crates.

pub mod clock;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use storage::{ByteStream, StorageObjectMeta, StorageProvider};
