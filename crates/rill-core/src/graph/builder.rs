//! Fluent graph construction.

use crate::arg::Arg;
use crate::ugen::{Constructor, constructor};
use crate::ugens::{Oscillator, Product, Shape, Sum};

use super::{Edge, Graph, GraphError, Node, NodeId};

/// Accumulates nodes and edges, validating on [`build`](Self::build).
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a prepared node.
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds a node built by `ctor`.
    pub fn ugen(
        self,
        id: impl Into<NodeId>,
        kind: &str,
        ctor: Constructor,
        args: Vec<Arg>,
    ) -> Self {
        self.node(Node::new(id, kind, ctor, args))
    }

    /// Adds a `const` node.
    pub fn constant(self, id: impl Into<NodeId>, value: f64) -> Self {
        self.node(Node::constant(id, value))
    }

    /// Adds a `sum` node.
    pub fn sum(self, id: impl Into<NodeId>) -> Self {
        self.ugen(id, "sum", constructor(|_| Ok(Box::new(Sum))), vec![])
    }

    /// Adds a `product` node.
    pub fn product(self, id: impl Into<NodeId>) -> Self {
        self.ugen(id, "product", constructor(|_| Ok(Box::new(Product))), vec![])
    }

    /// Adds a `sine` node at `frequency` Hz.
    pub fn sine(self, id: impl Into<NodeId>, frequency: f64) -> Self {
        self.ugen(
            id,
            "sine",
            constructor(|args| Ok(Box::new(Oscillator::from_args(Shape::Sine, args)?))),
            vec![Arg::Number(frequency)],
        )
    }

    /// Adds an `out` sink for `channel`.
    pub fn out(self, id: impl Into<NodeId>, channel: usize) -> Self {
        self.node(Node::out(id, channel))
    }

    /// Connects `from` to port `port` of `to`.
    pub fn edge(
        mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        port: impl Into<String>,
    ) -> Self {
        self.edges.push(Edge::new(from, to, port));
        self
    }

    /// Validates and freezes the graph.
    pub fn build(self) -> Result<Graph, GraphError> {
        let graph = self.build_unchecked();
        graph.validate()?;
        Ok(graph)
    }

    /// Freezes the graph without validation.
    pub fn build_unchecked(self) -> Graph {
        Graph::new(self.nodes, self.edges)
    }
}
