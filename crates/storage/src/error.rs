use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cipher error: {0}")]
    Cipher(String),

    #[error("unknown schema: {0}")]
    UnknownSchema(String),

    #[error("malformed envelope in {path}: {reason}")]
    Envelope { path: PathBuf, reason: String },

    #[error("invalid schema declaration: {0}")]
    InvalidSchema(String),

    #[error("no ids left for schema '{0}'")]
    IdExhausted(String),

    #[error("write-back for table '{0}' was dropped before completing")]
    WriteAborted(String),
}

pub type Result<T> = std::result::Result<T, Error>;
