//! CLI error types.

use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No table with this name exists in the store.
    #[error("table '{0}' does not exist")]
    TableNotFound(String),

    /// The store rejected the document (schema kind or validity).
    #[error("document rejected by the schema of '{0}'")]
    Rejected(String),

    /// A table could not be created.
    #[error("cannot create table '{table}': it exists, the name is not a plain file name, or schema '{schema}' is unknown")]
    TableNotCreated { table: String, schema: String },

    /// A command-line argument could not be interpreted.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// An error occurred in the policy layer.
    #[error(transparent)]
    Policy(#[from] policy::Error),

    /// An access check failed.
    #[error(transparent)]
    Session(#[from] session::Error),

    /// A document could not be parsed or printed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
