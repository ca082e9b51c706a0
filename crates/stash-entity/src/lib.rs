//! # stash-entity
//!
//! Domain entity models for Stash. Every struct in this crate represents a
//! database table row or a domain value object. Row types additionally
//! derive `sqlx::FromRow`.

pub mod account;
pub mod file;
pub mod folder;
pub mod upload;
