//! Shared graph handle
//!
//! All mutations go through [`SharedGraph`] so that observers hear about them.
//! Each successful mutation emits `GraphChanged` with the new revision; reset
//! emits `GraphReset`.

use crate::error::Result;
use crate::graph::PipelineGraph;
use crate::node::{FilterSettings, Node, NodeId, NodeKind};
use mint_common::events::{EventBus, MintEvent};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::debug;

/// Cloneable handle to one pipeline graph
#[derive(Clone)]
pub struct SharedGraph {
    pub(crate) graph: Arc<RwLock<PipelineGraph>>,
    pub(crate) event_bus: EventBus,
}

impl SharedGraph {
    pub fn new(graph: PipelineGraph, event_bus: EventBus) -> Self {
        Self {
            graph: Arc::new(RwLock::new(graph)),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Read guard; hold it for the whole query to see one consistent graph
    pub async fn read(&self) -> RwLockReadGuard<'_, PipelineGraph> {
        self.graph.read().await
    }

    /// Owned copy of the current graph
    pub async fn snapshot(&self) -> PipelineGraph {
        self.graph.read().await.clone()
    }

    pub async fn revision(&self) -> u64 {
        self.graph.read().await.revision()
    }

    fn changed(&self, revision: u64) {
        debug!("Graph changed (revision {})", revision);
        self.event_bus.emit_lossy(MintEvent::graph_changed(revision));
    }

    /// See [`PipelineGraph::add_node`]
    pub async fn add_node(&self, node: Node) -> Result<()> {
        let revision = {
            let mut graph = self.graph.write().await;
            graph.add_node(node)?;
            graph.revision()
        };
        self.changed(revision);
        Ok(())
    }

    /// See [`PipelineGraph::add_node_of_kind`]
    pub async fn add_node_of_kind(&self, kind: NodeKind) -> NodeId {
        let (id, revision) = {
            let mut graph = self.graph.write().await;
            let id = graph.add_node_of_kind(kind);
            (id, graph.revision())
        };
        self.changed(revision);
        id
    }

    /// Remove a node and its edges; emits only if the node existed
    pub async fn remove_node(&self, id: &str) -> Option<Node> {
        let (removed, revision) = {
            let mut graph = self.graph.write().await;
            let removed = graph.remove_node(id);
            (removed, graph.revision())
        };
        if removed.is_some() {
            self.changed(revision);
        }
        removed
    }

    /// Add an edge if legal; a rejected edge emits nothing
    pub async fn add_edge(&self, source: &str, target: &str) -> bool {
        let (added, revision) = {
            let mut graph = self.graph.write().await;
            let added = graph.add_edge(source, target);
            (added, graph.revision())
        };
        if added {
            self.changed(revision);
        }
        added
    }

    pub async fn remove_edge(&self, source: &str, target: &str) -> bool {
        let (removed, revision) = {
            let mut graph = self.graph.write().await;
            let removed = graph.remove_edge(source, target);
            (removed, graph.revision())
        };
        if removed {
            self.changed(revision);
        }
        removed
    }

    /// See [`PipelineGraph::set_filter_settings`]
    pub async fn set_filter_settings(&self, id: &str, settings: FilterSettings) -> Result<()> {
        let revision = {
            let mut graph = self.graph.write().await;
            graph.set_filter_settings(id, settings)?;
            graph.revision()
        };
        self.changed(revision);
        Ok(())
    }

    /// Clear the graph and emit `GraphReset`
    pub async fn reset(&self) {
        let revision = {
            let mut graph = self.graph.write().await;
            graph.reset();
            graph.revision()
        };
        debug!("Graph reset (revision {})", revision);
        self.event_bus.emit_lossy(MintEvent::graph_reset(revision));
    }
}

impl Default for SharedGraph {
    fn default() -> Self {
        Self::new(PipelineGraph::new(), EventBus::default())
    }
}
