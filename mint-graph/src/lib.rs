//! # Mint Pipeline Graph
//!
//! Directed graph of typed pipeline nodes (source → filter → ml → chart) with
//! connection-legality rules and activation (reachability) queries.
//!
//! - [`PipelineGraph`]: plain graph value, all queries are pure
//! - [`SharedGraph`]: async handle that emits graph events after mutations
//! - [`ActivationMonitor`]: observer that keeps node statuses current

pub mod error;
pub mod graph;
pub mod monitor;
pub mod node;
pub mod rules;
pub mod shared;

pub use error::{GraphError, Result};
pub use graph::PipelineGraph;
pub use monitor::{ActivationMonitor, StatusMap, POLL_INTERVAL};
pub use node::{Edge, FilterSettings, FilterType, Node, NodeId, NodeKind, NodeStatus};
pub use rules::{ConnectionRules, LooseRules, StrictRules};
pub use shared::SharedGraph;
