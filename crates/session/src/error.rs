use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no access: {capability}")]
    AccessDenied { capability: String },

    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
