//! Patch files: graphs described in TOML.

use std::path::Path;

use rill_core::{Arg, Graph};
use rill_registry::{RegistryError, UGenRegistry};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// A graph description.
///
/// # TOML Format
///
/// ```toml
/// name = "tone"
///
/// [[nodes]]
/// id = "osc"
/// type = "sine"
/// args = [220.0]
///
/// [[nodes]]
/// id = "left"
/// type = "out"
/// args = [0]
///
/// [[edges]]
/// from = "osc"
/// to = "left"
/// port = "in"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Patch {
    /// Name of the patch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Nodes in declaration order.
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    /// Edges in declaration order.
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// One `[[nodes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeSpec {
    /// Node id, unique within the patch.
    pub id: String,
    /// Registry type tag, or `out`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Constructor arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Arg>,
    /// User-supplied dedup label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// One `[[edges]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EdgeSpec {
    /// Producer id.
    pub from: String,
    /// Consumer id.
    pub to: String,
    /// Consumer input port.
    pub port: String,
}

impl NodeSpec {
    /// Creates a node entry.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            args,
            key: None,
        }
    }
}

impl Patch {
    /// Create an empty named patch.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Add a node.
    pub fn with_node(mut self, node: NodeSpec) -> Self {
        self.nodes.push(node);
        self
    }

    /// Add an edge.
    pub fn with_edge(
        mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        self.edges.push(EdgeSpec {
            from: from.into(),
            to: to.into(),
            port: port.into(),
        });
        self
    }

    /// Load a patch from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load a patch from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Save the patch to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Convert the patch to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Display name: the `name` field or `"untitled"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("untitled")
    }

    /// Resolves every node through `registry` and validates the result.
    ///
    /// UGens are not constructed here; bad arguments surface when the graph
    /// is scheduled.
    pub fn to_graph(&self, registry: &UGenRegistry) -> Result<Graph, ConfigError> {
        let mut builder = Graph::builder();
        for spec in &self.nodes {
            let node = registry
                .node(spec.id.as_str(), &spec.kind, spec.args.clone())
                .map_err(|e| match e {
                    RegistryError::Unknown(kind) => ConfigError::UnknownUGen(kind),
                    other => ConfigError::invalid(spec.id.clone(), other.to_string()),
                })?;
            builder = builder.node(match &spec.key {
                Some(key) => node.with_key(key.clone()),
                None => node,
            });
        }
        for edge in &self.edges {
            builder = builder.edge(edge.from.as_str(), edge.to.as_str(), edge.port.as_str());
        }
        let graph = builder.build()?;
        tracing::debug!(
            patch = self.display_name(),
            nodes = graph.len(),
            edges = graph.edges().len(),
            "patch resolved"
        );
        Ok(graph)
    }

    /// Stable 64-bit FNV-1a hash of the patch contents.
    ///
    /// Equal patches hash equal regardless of the file's whitespace or
    /// comments, so hosts can skip re-submitting an unchanged patch.
    pub fn content_hash(&self) -> u64 {
        const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const PRIME: u64 = 0x0000_0100_0000_01b3;
        let canonical = format!("{:?}{:?}", self.nodes, self.edges);
        canonical.bytes().fold(OFFSET, |hash, byte| {
            (hash ^ u64::from(byte)).wrapping_mul(PRIME)
        })
    }
}
