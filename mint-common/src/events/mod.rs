//! Event types for the Mint event system
//!
//! Provides shared event definitions and EventBus for all Mint crates.

mod stream_types;

pub use stream_types::StreamState;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Mint event types
///
/// Events are broadcast via EventBus. Graph events replace the editor's
/// "edges changed" window event; stream events report the coordinator's
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MintEvent {
    /// A node or edge was added, removed or reconfigured
    ///
    /// Triggers:
    /// - Activation monitor: recompute node statuses
    /// - Pipeline session: recompute processing configuration
    GraphChanged {
        /// Graph revision after the mutation
        revision: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The whole graph was cleared
    GraphReset {
        revision: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Coordinator moved between connection states
    StreamStateChanged {
        old_state: StreamState,
        new_state: StreamState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Connection reached Closed
    StreamClosed {
        /// true if the peer confirmed the close, false if it was forced
        acknowledged: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A processing configuration was written to the socket
    ProcessingConfigSent {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// An inbound payload was discarded
    BatchRejected {
        reason: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl MintEvent {
    pub fn graph_changed(revision: u64) -> Self {
        MintEvent::GraphChanged {
            revision,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn graph_reset(revision: u64) -> Self {
        MintEvent::GraphReset {
            revision,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn stream_state_changed(old_state: StreamState, new_state: StreamState) -> Self {
        MintEvent::StreamStateChanged {
            old_state,
            new_state,
            timestamp: chrono::Utc::now(),
        }
    }

    /// Whether this event invalidates anything derived from the graph
    pub fn is_graph_event(&self) -> bool {
        matches!(
            self,
            MintEvent::GraphChanged { .. } | MintEvent::GraphReset { .. }
        )
    }
}

// ========================================
// EventBus Implementation
// ========================================

/// Central event distribution bus
///
/// Uses tokio::broadcast internally:
/// - Non-blocking publish (slow subscribers don't block producers)
/// - Multiple concurrent subscribers
/// - Lagged message detection for slow subscribers
///
/// # Examples
///
/// ```
/// use mint_common::events::{EventBus, MintEvent};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(MintEvent::graph_changed(1));
/// assert!(matches!(rx.try_recv(), Ok(MintEvent::GraphChanged { revision: 1, .. })));
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MintEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MintEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: MintEvent,
    ) -> Result<usize, broadcast::error::SendError<MintEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MintEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
