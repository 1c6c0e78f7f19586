//! Common error types for the funnel crates

use thiserror::Error;

/// Common result type for funnel operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the funnel crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error (wraps serde_json::Error)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Key-value storage error (lock poisoned, unreadable backing file)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Analytics collector construction or ingestion error
    #[error("Collector error: {0}")]
    Collector(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
