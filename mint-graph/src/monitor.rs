//! Activation monitor
//!
//! Keeps a published map of node statuses current. Recomputes when:
//! - a graph event arrives on the event bus
//! - the streaming flag changes
//! - the poll interval elapses (safety net for missed events)
//!
//! Subscribers are only woken when the map actually changes.

use crate::graph::PipelineGraph;
use crate::node::{NodeId, NodeStatus};
use crate::shared::SharedGraph;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Fallback recompute period
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

pub type StatusMap = BTreeMap<NodeId, NodeStatus>;

/// Background observer publishing node statuses
pub struct ActivationMonitor {
    statuses: watch::Receiver<StatusMap>,
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ActivationMonitor {
    /// Spawn the monitor with the default poll interval
    pub fn start(graph: SharedGraph, streaming: watch::Receiver<bool>) -> Self {
        Self::start_with_interval(graph, streaming, POLL_INTERVAL)
    }

    /// Spawn the monitor with a custom poll interval
    pub fn start_with_interval(
        graph: SharedGraph,
        streaming: watch::Receiver<bool>,
        poll_interval: Duration,
    ) -> Self {
        let (tx, rx) = watch::channel(StatusMap::new());
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(run(graph, streaming, tx, Arc::clone(&shutdown), poll_interval));

        Self {
            statuses: rx,
            shutdown,
            handle,
        }
    }

    /// Receiver woken whenever some node's status changes
    pub fn subscribe(&self) -> watch::Receiver<StatusMap> {
        self.statuses.clone()
    }

    /// Latest published statuses
    pub fn current(&self) -> StatusMap {
        self.statuses.borrow().clone()
    }

    /// Stop the background task and wait for it
    pub async fn shutdown(self) {
        self.shutdown.notify_one();
        if let Err(e) = self.handle.await {
            warn!("Activation monitor task failed: {}", e);
        }
    }
}

fn publish(tx: &watch::Sender<StatusMap>, graph: &PipelineGraph, streaming: bool) {
    let next = graph.statuses(streaming);
    let changed = tx.send_if_modified(|current| {
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
    if changed {
        debug!("Node statuses updated (revision {})", graph.revision());
    }
}

async fn run(
    graph: SharedGraph,
    mut streaming: watch::Receiver<bool>,
    tx: watch::Sender<StatusMap>,
    shutdown: Arc<Notify>,
    poll_interval: Duration,
) {
    info!("Activation monitor started");

    let mut events = graph.event_bus().subscribe();
    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flag_open = true;

    loop {
        tokio::select! {
            _ = shutdown.notified() => break,

            event = events.recv() => match event {
                Ok(event) if event.is_graph_event() => {}
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("Activation monitor lagged {} events, recomputing", n);
                }
                Err(RecvError::Closed) => break,
            },

            changed = streaming.changed(), if flag_open => {
                if changed.is_err() {
                    // Flag owner is gone; the last value stays in effect
                    flag_open = false;
                    continue;
                }
            }

            _ = poll.tick() => {}
        }

        let is_streaming = *streaming.borrow();
        let guard = graph.read().await;
        publish(&tx, &guard, is_streaming);
    }

    info!("Activation monitor stopped");
}
