//! Convenience result type alias for camrelay.

use crate::error::AppError;

/// A specialized `Result` type for camrelay operations.
pub type AppResult<T> = Result<T, AppError>;
