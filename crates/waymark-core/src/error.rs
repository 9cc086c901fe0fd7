//! Error types for waymark-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using waymark-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in waymark-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local record store error
    #[error("Store error: {0}")]
    Store(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote objective service error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Objective not found
    #[error("Objective not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
