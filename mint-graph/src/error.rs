//! Error types for graph mutations
//!
//! Rejected edges are not errors (they are a silent `false`), and queries
//! never fail; only node-level mutations can.

use crate::node::NodeKind;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    /// No node with this id
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Operation applies to a different node kind
    #[error("Node {id} is a {actual} node, expected {expected}")]
    WrongKind {
        id: String,
        expected: NodeKind,
        actual: NodeKind,
    },
}

pub type Result<T> = std::result::Result<T, GraphError>;
