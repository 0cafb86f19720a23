//! Common error types for annograph

use thiserror::Error;

/// Common result type for annograph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the importer crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid row or parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
