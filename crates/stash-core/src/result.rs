//! Convenience result type alias for Stash.

use crate::error::AppError;

/// A specialized `Result` type for Stash operations.
pub type AppResult<T> = Result<T, AppError>;
