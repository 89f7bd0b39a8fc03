//! Immutable graph snapshots.
//!
//! A [`Graph`] is an ordered list of [`Node`]s plus an ordered list of
//! [`Edge`]s. It is built once (usually through [`GraphBuilder`]), handed to
//! the runner, and never mutated. Directed cycles are allowed; the scheduler
//! breaks them when it plans an epoch.
//!
//! # Invariants
//!
//! [`Graph::validate`] checks, in order:
//!
//! 1. node ids are unique ([`GraphError::DuplicateNode`])
//! 2. every edge endpoint exists ([`GraphError::UnknownNode`])
//! 3. no input port receives two edges ([`GraphError::DuplicatePort`])
//! 4. every sink has a non-negative index ([`GraphError::InvalidSink`]) and
//!    indices are distinct ([`GraphError::DuplicateSinkIndex`])
//! 5. there is at least one sink ([`GraphError::MissingSink`])
//!
//! # Example
//!
//! ```rust
//! use rill_core::graph::Graph;
//!
//! let graph = Graph::builder()
//!     .constant("c1", 0.25)
//!     .constant("c2", -0.10)
//!     .sum("s")
//!     .out("out0", 0)
//!     .edge("c1", "s", "$0")
//!     .edge("c2", "s", "$1")
//!     .edge("s", "out0", "in")
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(graph.sinks().count(), 1);
//! assert_eq!(graph.incoming(&"s".into()).count(), 2);
//! ```

mod builder;
mod edge;
mod node;

pub use builder::GraphBuilder;
pub use edge::Edge;
pub use node::{CONST_TYPE, Node, NodeId, OUT_TYPE};

use std::collections::{HashMap, HashSet};

/// Structural problems found in a graph.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An id was looked up or referenced by an edge but is not in the graph.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Two nodes share an id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// An input port has more than one incoming edge.
    #[error("port '{port}' of node {node} has more than one incoming edge")]
    DuplicatePort {
        /// Consuming node.
        node: NodeId,
        /// Port name.
        port: String,
    },

    /// The graph has no `out` node.
    #[error("graph has no sink nodes")]
    MissingSink,

    /// A sink lacks a usable channel index.
    #[error("invalid sink {node}: {reason}")]
    InvalidSink {
        /// The offending sink.
        node: NodeId,
        /// What is wrong with it.
        reason: String,
    },

    /// Two sinks claim the same channel.
    #[error("sink index {index} is used by more than one out node")]
    DuplicateSinkIndex {
        /// The contested channel.
        index: usize,
    },
}

/// An immutable snapshot of nodes and edges.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index: HashMap<NodeId, usize>,
}

impl Graph {
    /// Wraps nodes and edges without validating them.
    ///
    /// Call [`validate`](Self::validate) (or use [`GraphBuilder::build`]) before
    /// relying on the invariants.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            index.entry(node.id().clone()).or_insert(i);
        }
        Self {
            nodes,
            edges,
            index,
        }
    }

    /// Starts a [`GraphBuilder`].
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    /// A graph that feeds constant zero into sinks `0..channels`.
    pub fn silence(channels: usize) -> Self {
        let mut nodes = vec![Node::constant("zero", 0.0)];
        let mut edges = Vec::with_capacity(channels);
        for channel in 0..channels {
            let id = format!("out{channel}");
            nodes.push(Node::out(id.as_str(), channel));
            edges.push(Edge::new("zero", id, "in"));
        }
        Self::new(nodes, edges)
    }

    /// Nodes in declaration order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Edges in declaration order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node by id.
    pub fn node(&self, id: &NodeId) -> Result<&Node, GraphError> {
        self.index
            .get(id)
            .map(|&i| &self.nodes[i])
            .ok_or_else(|| GraphError::UnknownNode(id.clone()))
    }

    /// Position of a node in [`nodes`](Self::nodes).
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Edges ending at `id`, in edge-list order.
    pub fn incoming<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.to == id)
    }

    /// Edges leaving `id`, in edge-list order.
    pub fn outgoing<'a>(&'a self, id: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| &e.from == id)
    }

    /// Sink nodes in declaration order.
    pub fn sinks(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_sink())
    }

    /// Checks every structural invariant.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.index.len() != self.nodes.len() {
            let mut seen = HashSet::with_capacity(self.nodes.len());
            for node in &self.nodes {
                if !seen.insert(node.id()) {
                    return Err(GraphError::DuplicateNode(node.id().clone()));
                }
            }
        }

        let mut ports = HashSet::with_capacity(self.edges.len());
        for edge in &self.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !self.index.contains_key(endpoint) {
                    return Err(GraphError::UnknownNode(endpoint.clone()));
                }
            }
            if !ports.insert((&edge.to, edge.port.as_str())) {
                return Err(GraphError::DuplicatePort {
                    node: edge.to.clone(),
                    port: edge.port.clone(),
                });
            }
        }

        let mut channels = HashSet::new();
        let mut sink_count = 0;
        for node in self.sinks() {
            sink_count += 1;
            let Some(index) = node.sink_index() else {
                return Err(GraphError::InvalidSink {
                    node: node.id().clone(),
                    reason: "first argument must be a non-negative integer channel".into(),
                });
            };
            if !channels.insert(index) {
                return Err(GraphError::DuplicateSinkIndex { index });
            }
        }
        if sink_count == 0 {
            return Err(GraphError::MissingSink);
        }
        Ok(())
    }
}
