//! Pipeline graph value and its queries
//!
//! All queries take `&self` and never fail. Each traversal builds its own
//! visited set so cycles terminate and concurrent readers never share state.

use crate::error::{GraphError, Result};
use crate::node::{Edge, FilterSettings, Node, NodeId, NodeKind, NodeStatus};
use crate::rules::{ConnectionRules, StrictRules};
use mint_common::config::ProcessingDefaults;
use mint_common::ProcessingConfig;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

/// Directed graph of typed pipeline nodes
///
/// Nodes are keyed by id. Edges are kept in insertion order; every edge
/// references two existing nodes. Legality is checked only when an edge is
/// created, so replacing the rule set never invalidates existing edges.
#[derive(Debug, Clone)]
pub struct PipelineGraph {
    /// Nodes by id
    nodes: HashMap<NodeId, Node>,

    /// Directed edges, no duplicates
    edges: Vec<Edge>,

    /// Rule set consulted by [`PipelineGraph::can_connect`]
    rules: Arc<dyn ConnectionRules>,

    /// Mutation counter carried in `GraphChanged` events
    revision: u64,

    /// Next candidate for generated `node_N` ids
    next_id: u64,
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineGraph {
    /// Empty graph with [`StrictRules`]
    pub fn new() -> Self {
        Self::with_rules(Arc::new(StrictRules))
    }

    /// Empty graph judging new edges with `rules`
    ///
    /// # Arguments
    ///
    /// * `rules` - Connection rule set, e.g. [`StrictRules`] or
    ///   [`LooseRules`](crate::rules::LooseRules)
    pub fn with_rules(rules: Arc<dyn ConnectionRules>) -> Self {
        Self {
            nodes: HashMap::new(),
            edges: Vec::new(),
            rules,
            revision: 0,
            next_id: 1,
        }
    }

    /// Incremented on every successful mutation
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Rule set in force for new edges
    pub fn rules(&self) -> &dyn ConnectionRules {
        self.rules.as_ref()
    }

    /// Node by id, if present
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// All nodes, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All edges in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Whether the exact edge `source → target` exists
    pub fn has_edge(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source.as_str() == source && e.target.as_str() == target)
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    /// Insert a node under its own id
    ///
    /// # Errors
    ///
    /// [`GraphError::DuplicateNode`] if the id is already taken; the graph is
    /// left unchanged.
    pub fn add_node(&mut self, node: Node) -> Result<()> {
        if self.nodes.contains_key(&node.id) {
            return Err(GraphError::DuplicateNode(node.id.to_string()));
        }
        debug!("Adding {} node {}", node.kind, node.id);
        self.nodes.insert(node.id.clone(), node);
        self.bump();
        Ok(())
    }

    /// Add a node with a generated `node_N` id, skipping ids already taken
    pub fn add_node_of_kind(&mut self, kind: NodeKind) -> NodeId {
        let id = loop {
            let candidate = NodeId::new(format!("node_{}", self.next_id));
            self.next_id += 1;
            if !self.nodes.contains_key(&candidate) {
                break candidate;
            }
        };
        self.nodes.insert(id.clone(), Node::new(id.clone(), kind));
        self.bump();
        debug!("Adding {} node {}", kind, id);
        id
    }

    /// Remove a node together with every edge touching it
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.remove(id)?;
        let before = self.edges.len();
        self.edges.retain(|e| !e.touches(id));
        debug!(
            "Removed node {} and {} attached edge(s)",
            id,
            before - self.edges.len()
        );
        self.bump();
        Some(node)
    }

    /// Whether an edge `source → target` would be accepted
    pub fn can_connect(&self, source: &str, target: &str) -> bool {
        if source == target {
            return false;
        }
        match (self.nodes.get(source), self.nodes.get(target)) {
            (Some(s), Some(t)) => self.rules.allows(s.kind, t.kind),
            _ => false,
        }
    }

    /// Add an edge if legal; returns `false` and leaves the graph untouched
    /// otherwise (including when the edge already exists)
    pub fn add_edge(&mut self, source: &str, target: &str) -> bool {
        if !self.can_connect(source, target) {
            trace!("Rejected edge {} -> {} ({} rules)", source, target, self.rules.name());
            return false;
        }
        if self.has_edge(source, target) {
            return false;
        }
        self.edges.push(Edge::new(source, target));
        self.bump();
        debug!("Added edge {} -> {}", source, target);
        true
    }

    /// Remove the edge `source → target`; `false` if it did not exist
    pub fn remove_edge(&mut self, source: &str, target: &str) -> bool {
        let before = self.edges.len();
        self.edges
            .retain(|e| !(e.source.as_str() == source && e.target.as_str() == target));
        if self.edges.len() == before {
            return false;
        }
        self.bump();
        debug!("Removed edge {} -> {}", source, target);
        true
    }

    /// Clear all nodes and edges; the revision keeps counting
    pub fn reset(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.next_id = 1;
        self.bump();
        debug!("Graph reset");
    }

    /// Replace the settings of a filter node
    ///
    /// # Errors
    ///
    /// - [`GraphError::UnknownNode`] if no node has this id
    /// - [`GraphError::WrongKind`] if the node is not a filter
    pub fn set_filter_settings(&mut self, id: &str, settings: FilterSettings) -> Result<()> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;
        if node.kind != NodeKind::Filter {
            return Err(GraphError::WrongKind {
                id: id.to_string(),
                expected: NodeKind::Filter,
                actual: node.kind,
            });
        }
        node.filter = Some(settings);
        self.bump();
        Ok(())
    }

    // ========================================================================
    // Activation queries
    // ========================================================================

    fn predecessors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target.as_str() == id)
            .map(|e| &e.source)
    }

    fn successors<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a NodeId> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.source.as_str() == id)
            .map(|e| &e.target)
    }

    fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// Whether some source node reaches `id` through existing edges
    ///
    /// Walks incoming edges backwards. A node without incoming edges is never
    /// activated, source nodes included.
    pub fn is_activated(&self, id: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut worklist: Vec<&str> = self.predecessors(id).map(NodeId::as_str).collect();

        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            if self.kind_of(current) == Some(NodeKind::Source) {
                return true;
            }
            worklist.extend(
                self.predecessors(current)
                    .map(NodeId::as_str)
                    .filter(|p| !visited.contains(p)),
            );
        }
        false
    }

    /// Whether an immediate predecessor of kind `required` is itself fed
    /// from a source
    ///
    /// A predecessor that is a source node satisfies the second half on its own.
    pub fn is_activated_via(&self, id: &str, required: NodeKind) -> bool {
        self.predecessors(id).any(|p| match self.kind_of(p.as_str()) {
            Some(kind) if kind == required => {
                kind == NodeKind::Source || self.is_activated(p.as_str())
            }
            _ => false,
        })
    }

    /// Activation as shown for this node's kind
    fn activated_for_kind(&self, node: &Node) -> bool {
        match node.kind {
            NodeKind::Ml => self.is_activated_via(node.id.as_str(), NodeKind::Filter),
            _ => self.is_activated(node.id.as_str()),
        }
    }

    /// Display status of one node; `None` for an unknown id
    ///
    /// ML nodes count as activated only when fed by an activated filter.
    /// `live` is `activated && streaming`.
    pub fn status_of(&self, id: &str, streaming: bool) -> Option<NodeStatus> {
        let node = self.nodes.get(id)?;
        Some(NodeStatus::new(self.activated_for_kind(node), streaming))
    }

    /// [`status_of`](Self::status_of) for every node, ordered by id
    pub fn statuses(&self, streaming: bool) -> BTreeMap<NodeId, NodeStatus> {
        self.nodes
            .values()
            .map(|n| (n.id.clone(), NodeStatus::new(self.activated_for_kind(n), streaming)))
            .collect()
    }

    /// Whether `from` reaches an activated ml or chart node downstream
    fn feeds_consumer(&self, from: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut worklist: Vec<&str> = self.successors(from).map(NodeId::as_str).collect();

        while let Some(current) = worklist.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(node) = self.nodes.get(current) {
                let consumer = matches!(node.kind, NodeKind::Ml | NodeKind::Chart);
                if consumer && self.activated_for_kind(node) {
                    return true;
                }
            }
            worklist.extend(
                self.successors(current)
                    .map(NodeId::as_str)
                    .filter(|s| !visited.contains(s)),
            );
        }
        false
    }

    /// Filter node whose settings define the processing config
    ///
    /// Among activated filters (ordered by id), the first that feeds an
    /// activated ml or chart node wins; failing that, the first activated
    /// filter.
    pub fn contributing_filter(&self) -> Option<&Node> {
        let mut filters: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::Filter && self.is_activated(n.id.as_str()))
            .collect();
        filters.sort_by(|a, b| a.id.cmp(&b.id));

        filters
            .iter()
            .find(|f| self.feeds_consumer(f.id.as_str()))
            .or_else(|| filters.first())
            .copied()
    }

    /// Processing config for the producer, derived from the contributing filter
    pub fn processing_config(&self, defaults: &ProcessingDefaults) -> ProcessingConfig {
        let settings = self
            .contributing_filter()
            .map(|n| n.filter.clone().unwrap_or_default());

        match settings {
            Some(s) => ProcessingConfig {
                apply_bandpass: s.applies_bandpass(),
                use_iir: s.use_iir,
                l_freq: s.l_freq,
                h_freq: s.h_freq,
                downsample_factor: s.downsample_factor,
                sfreq: defaults.sfreq,
                n_channels: defaults.n_channels,
            },
            None => ProcessingConfig::passthrough(defaults.sfreq, defaults.n_channels),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::FilterType;
    use crate::rules::LooseRules;

    fn graph_of(nodes: &[(&str, NodeKind)]) -> PipelineGraph {
        let mut graph = PipelineGraph::new();
        for (id, kind) in nodes {
            graph.add_node(Node::new(*id, *kind)).unwrap();
        }
        graph
    }

    fn chain() -> PipelineGraph {
        let mut graph = graph_of(&[
            ("S", NodeKind::Source),
            ("F", NodeKind::Filter),
            ("M", NodeKind::Ml),
        ]);
        assert!(graph.add_edge("S", "F"));
        assert!(graph.add_edge("F", "M"));
        graph
    }

    #[test]
    fn test_self_loops_never_connect() {
        let graph = graph_of(&[
            ("S", NodeKind::Source),
            ("F", NodeKind::Filter),
            ("M", NodeKind::Ml),
            ("C", NodeKind::Chart),
        ]);
        for id in ["S", "F", "M", "C"] {
            assert!(!graph.can_connect(id, id));
        }

        let loose = PipelineGraph::with_rules(Arc::new(LooseRules));
        assert!(!loose.can_connect("X", "X"));
    }

    #[test]
    fn test_ml_predecessor_rule() {
        let graph = graph_of(&[
            ("S", NodeKind::Source),
            ("F", NodeKind::Filter),
            ("M", NodeKind::Ml),
            ("M2", NodeKind::Ml),
            ("C", NodeKind::Chart),
        ]);
        assert!(graph.can_connect("F", "M"));
        assert!(!graph.can_connect("S", "M"));
        assert!(!graph.can_connect("C", "M"));
        assert!(!graph.can_connect("M2", "M"));
    }

    #[test]
    fn test_unknown_ids_rejected() {
        let graph = graph_of(&[("S", NodeKind::Source)]);
        assert!(!graph.can_connect("S", "missing"));
        assert!(!graph.can_connect("missing", "S"));
    }

    #[test]
    fn test_chain_is_activated_transitively() {
        let graph = chain();
        assert!(graph.is_activated("F"));
        assert!(graph.is_activated("M"));
        assert!(graph.is_activated_via("M", NodeKind::Filter));
    }

    #[test]
    fn test_cycle_without_source_terminates_inactive() {
        let mut graph = graph_of(&[("A", NodeKind::Chart), ("B", NodeKind::Chart)]);
        assert!(graph.add_edge("A", "B"));
        assert!(graph.add_edge("B", "A"));
        assert!(!graph.is_activated("A"));
        assert!(!graph.is_activated("B"));
    }

    #[test]
    fn test_fan_in_with_one_rooted_path_is_activated() {
        let mut graph = graph_of(&[
            ("S", NodeKind::Source),
            ("A", NodeKind::Chart),
            ("B", NodeKind::Chart),
            ("C", NodeKind::Chart),
        ]);
        assert!(graph.add_edge("S", "A"));
        assert!(graph.add_edge("A", "C"));
        assert!(graph.add_edge("B", "C"));
        assert!(!graph.is_activated("B"));
        assert!(graph.is_activated("C"));
    }

    #[test]
    fn test_unconnected_source_not_activated() {
        let graph = graph_of(&[("S", NodeKind::Source)]);
        assert!(!graph.is_activated("S"));
        assert_eq!(
            graph.status_of("S", true),
            Some(NodeStatus { activated: false, live: false })
        );
    }

    #[test]
    fn test_removing_edge_deactivates_downstream() {
        let mut graph = chain();
        assert!(graph.is_activated("M"));
        assert!(graph.remove_edge("S", "F"));
        assert!(!graph.is_activated("M"));
        assert!(!graph.remove_edge("S", "F"));
    }

    #[test]
    fn test_source_to_ml_edge_rejected_silently() {
        let mut graph = graph_of(&[
            ("S", NodeKind::Source),
            ("F", NodeKind::Filter),
            ("M", NodeKind::Ml),
        ]);
        let revision = graph.revision();
        assert!(!graph.add_edge("S", "M"));
        assert!(graph.edges().is_empty());
        assert_eq!(graph.revision(), revision);
    }

    #[test]
    fn test_duplicate_edge_is_noop() {
        let mut graph = chain();
        let revision = graph.revision();
        assert!(!graph.add_edge("S", "F"));
        assert_eq!(graph.edges().len(), 2);
        assert_eq!(graph.revision(), revision);
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = graph_of(&[("S", NodeKind::Source)]);
        let err = graph.add_node(Node::filter("S")).unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("S".to_string()));
        assert_eq!(graph.node("S").map(|n| n.kind), Some(NodeKind::Source));
    }

    #[test]
    fn test_generated_ids_skip_taken_ones() {
        let mut graph = graph_of(&[("node_1", NodeKind::Source)]);
        let id = graph.add_node_of_kind(NodeKind::Filter);
        assert_eq!(id.as_str(), "node_2");
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_remove_node_prunes_edges() {
        let mut graph = chain();
        let removed = graph.remove_node("F").unwrap();
        assert_eq!(removed.kind, NodeKind::Filter);
        assert!(graph.edges().is_empty());
        assert!(!graph.is_activated("M"));
        assert!(graph.remove_node("F").is_none());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut graph = chain();
        let revision = graph.revision();
        graph.reset();
        assert_eq!(graph.node_count(), 0);
        assert!(graph.edges().is_empty());
        assert!(graph.revision() > revision);
    }

    #[test]
    fn test_loose_rules_allow_chart_into_filter() {
        let mut graph = PipelineGraph::with_rules(Arc::new(LooseRules));
        graph.add_node(Node::source("S")).unwrap();
        graph.add_node(Node::chart("C")).unwrap();
        graph.add_node(Node::filter("F")).unwrap();
        graph.add_node(Node::ml("M")).unwrap();

        assert!(graph.add_edge("C", "F"));
        assert!(!graph.add_edge("S", "M"));
    }

    #[test]
    fn test_ml_needs_activated_filter_predecessor() {
        let mut graph = PipelineGraph::with_rules(Arc::new(LooseRules));
        graph.add_node(Node::filter("F")).unwrap();
        graph.add_node(Node::ml("M")).unwrap();
        assert!(graph.add_edge("F", "M"));

        // Filter is not fed by anything
        assert!(!graph.is_activated_via("M", NodeKind::Filter));
        assert!(!graph.status_of("M", false).unwrap().activated);
    }

    #[test]
    fn test_statuses_reflect_streaming_flag() {
        let mut graph = chain();
        graph.add_node(Node::chart("C")).unwrap();

        let idle = graph.statuses(false);
        assert_eq!(idle.get("M"), Some(&NodeStatus { activated: true, live: false }));

        let live = graph.statuses(true);
        assert_eq!(live.get("M"), Some(&NodeStatus { activated: true, live: true }));
        assert_eq!(live.get("C"), Some(&NodeStatus { activated: false, live: false }));
        assert_eq!(live.get("S"), Some(&NodeStatus { activated: false, live: false }));
    }

    #[test]
    fn test_set_filter_settings_checks_kind() {
        let mut graph = chain();
        let settings = FilterSettings {
            filter_type: FilterType::Highpass,
            l_freq: Some(1.0),
            ..Default::default()
        };
        graph.set_filter_settings("F", settings.clone()).unwrap();
        assert_eq!(graph.node("F").unwrap().filter, Some(settings.clone()));

        assert!(matches!(
            graph.set_filter_settings("M", settings.clone()),
            Err(GraphError::WrongKind { expected: NodeKind::Filter, actual: NodeKind::Ml, .. })
        ));
        assert_eq!(
            graph.set_filter_settings("nope", settings),
            Err(GraphError::UnknownNode("nope".to_string()))
        );
    }

    #[test]
    fn test_processing_config_passthrough_without_filter() {
        let graph = graph_of(&[("S", NodeKind::Source)]);
        let config = graph.processing_config(&ProcessingDefaults::default());
        assert!(!config.apply_bandpass);
        assert_eq!(config.l_freq, None);
        assert_eq!(config.h_freq, None);
        assert_eq!(config.sfreq, 256.0);
        assert_eq!(config.n_channels, 4);
    }

    #[test]
    fn test_processing_config_from_contributing_filter() {
        let mut graph = chain();
        graph
            .set_filter_settings(
                "F",
                FilterSettings {
                    filter_type: FilterType::Bandpass,
                    use_iir: true,
                    l_freq: Some(1.0),
                    h_freq: Some(40.0),
                    downsample_factor: Some(2),
                },
            )
            .unwrap();

        let config = graph.processing_config(&ProcessingDefaults::default());
        assert!(config.apply_bandpass);
        assert!(config.use_iir);
        assert_eq!(config.l_freq, Some(1.0));
        assert_eq!(config.h_freq, Some(40.0));
        assert_eq!(config.downsample_factor, Some(2));
    }

    #[test]
    fn test_contributing_filter_prefers_one_feeding_a_consumer() {
        let mut graph = graph_of(&[
            ("S", NodeKind::Source),
            ("A", NodeKind::Filter),
            ("B", NodeKind::Filter),
            ("C", NodeKind::Chart),
        ]);
        assert!(graph.add_edge("S", "A"));
        assert!(graph.add_edge("S", "B"));
        assert_eq!(graph.contributing_filter().map(|n| n.id.as_str()), Some("A"));

        assert!(graph.add_edge("B", "C"));
        assert_eq!(graph.contributing_filter().map(|n| n.id.as_str()), Some("B"));
    }
}
