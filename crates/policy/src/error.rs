//! Policy error types.

use thiserror::Error;

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// An access declaration is malformed or conflicts with another one.
    #[error("invalid access declaration: {0}")]
    Invalid(String),

    /// A declaration references a role or action that does not exist.
    #[error("dangling reference: {0}")]
    Dangling(String),

    /// An access table is missing and could not be created.
    #[error("access table '{0}' is unavailable; is its schema registered?")]
    MissingTable(String),

    /// Failed to parse an access declaration file.
    #[error("failed to parse access declarations: {0}")]
    Parse(String),

    /// An I/O error occurred while reading declarations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
