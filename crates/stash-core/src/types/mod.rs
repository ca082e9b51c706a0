//! Core type definitions used across the Stash workspace.

pub mod id;

pub use id::*;
