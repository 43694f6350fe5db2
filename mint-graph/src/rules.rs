//! Connection-legality rule sets
//!
//! Rules only judge node kinds. Self-loops and unknown endpoints are rejected
//! by the graph before any rule set is consulted, so no implementation can
//! allow them.

use crate::node::NodeKind;
use std::fmt::Debug;

/// Decides whether an edge `source → target` may be created
pub trait ConnectionRules: Send + Sync + Debug {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool;

    /// Short name for logs
    fn name(&self) -> &'static str;
}

/// Type-adjacency rules used by the editor
///
/// - ML nodes may only be fed directly by a filter
/// - filter nodes may only be fed directly by a source
/// - every other target accepts any predecessor
#[derive(Debug, Clone, Copy, Default)]
pub struct StrictRules;

impl ConnectionRules for StrictRules {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        match target {
            NodeKind::Ml => source == NodeKind::Filter,
            NodeKind::Filter => source == NodeKind::Source,
            NodeKind::Source | NodeKind::Chart => true,
        }
    }

    fn name(&self) -> &'static str {
        "strict"
    }
}

/// Earlier permissive rules: only the ML predecessor restriction applies
#[derive(Debug, Clone, Copy, Default)]
pub struct LooseRules;

impl ConnectionRules for LooseRules {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        target != NodeKind::Ml || source == NodeKind::Filter
    }

    fn name(&self) -> &'static str {
        "loose"
    }
}
