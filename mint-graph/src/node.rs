//! Node and edge types

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Unique node identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pipeline node type
///
/// Accepts the editor's component names (`source-node`, `filter-node`,
/// `machine-learning-node`, `signal-graph-node`) as aliases when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    #[serde(alias = "source-node")]
    Source,
    #[serde(alias = "filter-node")]
    Filter,
    #[serde(alias = "machine-learning-node")]
    Ml,
    #[serde(alias = "signal-graph-node")]
    Chart,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::Source => write!(f, "source"),
            NodeKind::Filter => write!(f, "filter"),
            NodeKind::Ml => write!(f, "ml"),
            NodeKind::Chart => write!(f, "chart"),
        }
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" | "source-node" => Ok(NodeKind::Source),
            "filter" | "filter-node" => Ok(NodeKind::Filter),
            "ml" | "machine-learning-node" => Ok(NodeKind::Ml),
            "chart" | "signal-graph-node" => Ok(NodeKind::Chart),
            other => Err(format!("unknown node kind: {}", other)),
        }
    }
}

/// Filter response selected on a filter node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

/// Parameters carried by a filter node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterSettings {
    pub filter_type: FilterType,
    pub use_iir: bool,
    pub l_freq: Option<f64>,
    pub h_freq: Option<f64>,
    pub downsample_factor: Option<u32>,
}

impl FilterSettings {
    /// Whether these settings ask the producer to band-limit the signal
    pub fn applies_bandpass(&self) -> bool {
        self.filter_type == FilterType::Bandpass || self.l_freq.is_some() || self.h_freq.is_some()
    }
}

/// Default prediction shown on a fresh ML node
pub const DEFAULT_PREDICTION: &str = "stress";

/// Typed pipeline vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,

    /// Present on filter nodes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSettings>,

    /// Present on ML nodes only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            filter: (kind == NodeKind::Filter).then(FilterSettings::default),
            prediction: (kind == NodeKind::Ml).then(|| DEFAULT_PREDICTION.to_string()),
        }
    }

    pub fn source(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Source)
    }

    pub fn filter(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Filter)
    }

    pub fn ml(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Ml)
    }

    pub fn chart(id: impl Into<NodeId>) -> Self {
        Self::new(id, NodeKind::Chart)
    }
}

/// Directed connection between two nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
}

impl Edge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source.as_str() == id || self.target.as_str() == id
    }
}

/// Derived per-node state consumed by the view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Reachable from a source through existing edges
    pub activated: bool,

    /// Activated while the stream is on
    pub live: bool,
}

impl NodeStatus {
    pub fn new(activated: bool, streaming: bool) -> Self {
        Self {
            activated,
            live: activated && streaming,
        }
    }
}
