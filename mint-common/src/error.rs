//! Common error types for Mint

use thiserror::Error;

/// Common result type for Mint operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the Mint crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parse error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Message on the signal stream did not follow the wire protocol
    #[error("Protocol error: {0}")]
    Protocol(String),
}
