//! Graph edge type.

use super::node::NodeId;

/// A connection from one node's output to a named input port of another.
///
/// A port receives at most one edge; an output may fan out freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Producing node.
    pub from: NodeId,
    /// Consuming node.
    pub to: NodeId,
    /// Input port on `to`.
    pub port: String,
}

impl Edge {
    /// Creates an edge.
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            port: port.into(),
        }
    }

    /// Returns `true` when the edge feeds its own source.
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}
