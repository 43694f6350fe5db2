//! Streaming-related type definitions

use serde::{Deserialize, Serialize};

/// Lifecycle state of the streaming coordinator's single connection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "PascalCase")]
pub enum StreamState {
    /// No connection
    #[default]
    Idle,
    /// Connection being established
    Connecting,
    /// Connection established, batches accepted
    Open,
    /// `clientClosing` sent, waiting for acknowledgment or timeout
    ClosingGraceful,
    /// Connection fully closed
    Closed,
}

impl StreamState {
    /// Whether a socket is (or is about to be) held in this state
    pub fn holds_connection(&self) -> bool {
        matches!(
            self,
            StreamState::Connecting | StreamState::Open | StreamState::ClosingGraceful
        )
    }
}

impl std::fmt::Display for StreamState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamState::Idle => write!(f, "Idle"),
            StreamState::Connecting => write!(f, "Connecting"),
            StreamState::Open => write!(f, "Open"),
            StreamState::ClosingGraceful => write!(f, "ClosingGraceful"),
            StreamState::Closed => write!(f, "Closed"),
        }
    }
}
