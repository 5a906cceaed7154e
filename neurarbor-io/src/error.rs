//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed record.
    #[error("invalid record: {0}")]
    Json(#[from] serde_json::Error),

    /// Path is not usable for the requested operation.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] neurarbor_core::Error),
}
