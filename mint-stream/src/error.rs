//! Error types for the streaming client

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    /// WebSocket handshake or TCP connect failed
    #[error("Connection failed: {0}")]
    Connect(String),

    /// Writing to the socket failed
    #[error("Send failed: {0}")]
    Send(String),

    /// The coordinator task is no longer running
    #[error("Stream coordinator has stopped")]
    CoordinatorStopped,

    #[error(transparent)]
    Common(#[from] mint_common::Error),
}

pub type Result<T> = std::result::Result<T, StreamError>;
