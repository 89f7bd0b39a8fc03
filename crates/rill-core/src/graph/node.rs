//! Graph node types.

use std::fmt;
use std::sync::Arc;

use crate::arg::Arg;
use crate::ugen::{Constructor, UGen, UGenError, constructor};
use crate::ugens::{Constant, OutMix};

/// Type tag of sink nodes.
pub const OUT_TYPE: &str = "out";

/// Type tag of constant nodes, matched by value during alignment.
pub const CONST_TYPE: &str = "const";

/// Interned node identifier.
///
/// Cloning is a reference-count bump. Identifiers are only meaningful within
/// one [`Graph`](super::Graph); across graphs identity comes from alignment.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    /// Creates an identifier.
    pub fn new(id: &str) -> Self {
        Self(Arc::from(id))
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(Arc::from(id))
    }
}

impl From<&NodeId> for NodeId {
    fn from(id: &NodeId) -> Self {
        id.clone()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", &*self.0)
    }
}

/// One vertex of a [`Graph`](super::Graph).
///
/// `out` nodes are sinks: they carry a channel index as their first argument
/// and are never built from a user constructor.
#[derive(Clone)]
pub struct Node {
    id: NodeId,
    kind: String,
    ctor: Option<Constructor>,
    args: Vec<Arg>,
    key: Option<String>,
    sink: bool,
}

impl Node {
    /// Creates a node that builds its UGen with `ctor`.
    pub fn new(
        id: impl Into<NodeId>,
        kind: impl Into<String>,
        ctor: Constructor,
        args: Vec<Arg>,
    ) -> Self {
        let kind = kind.into();
        let sink = kind == OUT_TYPE;
        Self {
            id: id.into(),
            kind,
            ctor: (!sink).then_some(ctor),
            args,
            key: None,
            sink,
        }
    }

    /// Creates a `const` node emitting `value`.
    pub fn constant(id: impl Into<NodeId>, value: f64) -> Self {
        Self::new(
            id,
            CONST_TYPE,
            constructor(|args| Ok(Box::new(Constant::from_args(args)?))),
            vec![Arg::Number(value)],
        )
    }

    /// Creates an `out` sink for `channel`.
    pub fn out(id: impl Into<NodeId>, channel: usize) -> Self {
        Self {
            id: id.into(),
            kind: OUT_TYPE.to_string(),
            ctor: None,
            args: vec![Arg::from(channel)],
            key: None,
            sink: true,
        }
    }

    /// Attaches a user dedup label.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Node identifier.
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Type tag, e.g. `sine`.
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Literal constructor arguments.
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// User dedup label.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns `true` for `out` nodes.
    pub fn is_sink(&self) -> bool {
        self.sink
    }

    /// The user constructor; `None` for sinks.
    pub fn constructor(&self) -> Option<&Constructor> {
        self.ctor.as_ref()
    }

    /// Output channel of a sink.
    pub fn sink_index(&self) -> Option<usize> {
        if self.sink {
            self.args.first().and_then(Arg::as_index)
        } else {
            None
        }
    }

    /// Value of a `const` node.
    pub fn constant_value(&self) -> Option<f64> {
        if self.kind == CONST_TYPE {
            self.args.first().and_then(Arg::as_f64)
        } else {
            None
        }
    }

    /// Same type and structurally equal arguments.
    pub fn same_as(&self, other: &Node) -> bool {
        self.kind == other.kind && self.args == other.args
    }

    /// Builds a fresh UGen for this node.
    ///
    /// Sinks get an [`OutMix`]; every other node runs its constructor.
    pub fn instantiate(&self) -> Result<Box<dyn UGen>, UGenError> {
        if let Some(channel) = self.sink_index() {
            return Ok(Box::new(OutMix::new(channel)));
        }
        match &self.ctor {
            Some(ctor) => ctor(&self.args),
            None => Err(UGenError::InvalidArgument(format!(
                "node {} has no constructor",
                self.id
            ))),
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("args", &self.args)
            .field("key", &self.key)
            .field("sink", &self.sink)
            .finish_non_exhaustive()
    }
}
