//! File entities.

pub mod model;

pub use model::{CreateFile, FileRecord};
