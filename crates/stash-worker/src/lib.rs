//! Background purge jobs and scheduling for Stash.
//!
//! This crate provides:
//! - A trash purge that hard-deletes items past their retention window
//! - An upload purge that reclaims abandoned upload sessions
//! - A scheduler that runs both on fixed intervals

pub mod jobs;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use jobs::{PurgeReport, TrashPurgeJob, UploadPurgeJob};
pub use scheduler::PurgeScheduler;
