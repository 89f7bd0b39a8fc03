//! UGen registry and factory for rill graphs.
//!
//! The registry maps type tags such as `sine` or `sum` to constructors, so
//! graphs can be assembled from data (patch files, the CLI) instead of code.
//!
//! # Features
//!
//! - **Discovery**: list every registered type with its ports
//! - **Factory**: build UGens or whole graph [`Node`]s by type tag
//! - **Categories**: sources, math, control and utility
//! - **Knobs**: `knob` nodes read a shared [`KnobBus`] the host can set
//!
//! # Example
//!
//! ```rust
//! use rill_core::{Arg, Graph};
//! use rill_registry::{UGenCategory, UGenRegistry};
//!
//! let registry = UGenRegistry::new();
//!
//! for ugen in registry.all() {
//!     println!("{}: {}", ugen.id, ugen.description);
//! }
//!
//! let osc = registry.node("osc", "sine", vec![Arg::Number(220.0)]).unwrap();
//! let out = registry.node("l", "out", vec![Arg::Int(0)]).unwrap();
//! let graph = Graph::builder().node(osc).node(out).edge("osc", "l", "in").build().unwrap();
//! assert_eq!(graph.len(), 2);
//!
//! assert_eq!(registry.in_category(UGenCategory::Source).len(), 5);
//! ```

use std::sync::Arc;

use rill_core::arg::number_or;
use rill_core::graph::{CONST_TYPE, OUT_TYPE};
use rill_core::ugens::{Constant, KnobReader, Noise, Oscillator, Product, Shape, Sum, Zap};
use rill_core::{Arg, Constructor, KnobBus, Node, NodeId, UGen, UGenError, constructor};

/// Category of UGen for organization and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UGenCategory {
    /// Oscillators and noise.
    Source,
    /// Per-sample arithmetic.
    Math,
    /// Host-driven values.
    Control,
    /// Sinks and signal hygiene.
    Utility,
}

impl UGenCategory {
    /// Returns a human-readable name for the category.
    pub const fn name(&self) -> &'static str {
        match self {
            UGenCategory::Source => "Source",
            UGenCategory::Math => "Math",
            UGenCategory::Control => "Control",
            UGenCategory::Utility => "Utility",
        }
    }

    /// Returns a description of the category.
    pub const fn description(&self) -> &'static str {
        match self {
            UGenCategory::Source => "Oscillators, phasors and noise generators",
            UGenCategory::Math => "Constants, sums and products",
            UGenCategory::Control => "Values set from outside the graph",
            UGenCategory::Utility => "Output sinks and gremlin zapping",
        }
    }
}

/// Describes a UGen type in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UGenDescriptor {
    /// Type tag used in graphs (lowercase, no spaces).
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Brief description.
    pub description: &'static str,
    /// Category for organization.
    pub category: UGenCategory,
    /// Input ports the UGen reads; `$k` stands for any indexed port.
    pub ports: &'static [&'static str],
}

/// Errors returned by [`UGenRegistry`].
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A type with this id is already registered.
    #[error("ugen type '{0}' is already registered")]
    Duplicate(String),

    /// No type with this id is registered.
    #[error("unknown ugen type '{0}'")]
    Unknown(String),

    /// The constructor rejected its arguments.
    #[error("cannot construct '{kind}': {source}")]
    Construct {
        /// Type tag.
        kind: String,
        /// Constructor error.
        #[source]
        source: UGenError,
    },
}

struct RegistryEntry {
    descriptor: UGenDescriptor,
    factory: Constructor,
}

/// Registry of UGen types.
///
/// All built-in types are registered by [`new`](Self::new); more can be
/// added with [`register`](Self::register).
pub struct UGenRegistry {
    entries: Vec<RegistryEntry>,
    knobs: KnobBus,
}

impl Default for UGenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const OSC_PORTS: &[&str] = &["w", "iphase", "sync"];

impl UGenRegistry {
    /// Creates a registry with every built-in type registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_builtins();
        registry
    }

    /// Creates a registry with nothing registered.
    pub fn empty() -> Self {
        Self {
            entries: Vec::with_capacity(12),
            knobs: KnobBus::new(),
        }
    }

    fn register_builtins(&mut self) {
        let builtins: Vec<(UGenDescriptor, Constructor)> = vec![
            (
                UGenDescriptor {
                    id: CONST_TYPE,
                    name: "Constant",
                    description: "Emits its first argument on every sample",
                    category: UGenCategory::Math,
                    ports: &[],
                },
                constructor(|args| Ok(Box::new(Constant::from_args(args)?))),
            ),
            (
                UGenDescriptor {
                    id: "sum",
                    name: "Sum",
                    description: "Per-sample sum of every indexed input",
                    category: UGenCategory::Math,
                    ports: &["$k"],
                },
                constructor(|_| Ok(Box::new(Sum))),
            ),
            (
                UGenDescriptor {
                    id: "product",
                    name: "Product",
                    description: "Per-sample product of every indexed input",
                    category: UGenCategory::Math,
                    ports: &["$k"],
                },
                constructor(|_| Ok(Box::new(Product))),
            ),
            (
                UGenDescriptor {
                    id: "sine",
                    name: "Sine",
                    description: "Sine oscillator",
                    category: UGenCategory::Source,
                    ports: OSC_PORTS,
                },
                oscillator(Shape::Sine),
            ),
            (
                UGenDescriptor {
                    id: "saw",
                    name: "Saw",
                    description: "Naive sawtooth in [-1, 1)",
                    category: UGenCategory::Source,
                    ports: OSC_PORTS,
                },
                oscillator(Shape::Saw),
            ),
            (
                UGenDescriptor {
                    id: "square",
                    name: "Square",
                    description: "Pulse wave with duty cycle on `dc`",
                    category: UGenCategory::Source,
                    ports: &["w", "iphase", "sync", "dc"],
                },
                oscillator(Shape::Square),
            ),
            (
                UGenDescriptor {
                    id: "phasor",
                    name: "Phasor",
                    description: "Raw phase ramp in [0, 1)",
                    category: UGenCategory::Source,
                    ports: OSC_PORTS,
                },
                oscillator(Shape::Phasor),
            ),
            (
                UGenDescriptor {
                    id: "noise",
                    name: "Noise",
                    description: "Seeded white noise in [-1, 1)",
                    category: UGenCategory::Source,
                    ports: &[],
                },
                constructor(|args| Ok(Box::new(Noise::from_args(args)?))),
            ),
            (
                UGenDescriptor {
                    id: "zap",
                    name: "Zap",
                    description: "Replaces denormal, huge and non-finite samples with zero",
                    category: UGenCategory::Utility,
                    ports: &["in"],
                },
                constructor(|_| Ok(Box::new(Zap))),
            ),
        ];
        for (descriptor, factory) in builtins {
            self.register_builtin(descriptor, factory);
        }

        let knobs = self.knobs.clone();
        self.register_builtin(
            UGenDescriptor {
                id: "knob",
                name: "Knob",
                description: "Reads a named host control: [name, default, min, max]",
                category: UGenCategory::Control,
                ports: &[],
            },
            constructor(move |args| knob(&knobs, args)),
        );
    }

    fn register_builtin(&mut self, descriptor: UGenDescriptor, factory: Constructor) {
        if let Err(err) = self.register(descriptor, factory) {
            tracing::error!(%err, "built-in ugen not registered");
        }
    }

    /// Adds a type.
    ///
    /// Fails if the id is taken; registered entries are never replaced.
    pub fn register(
        &mut self,
        descriptor: UGenDescriptor,
        factory: Constructor,
    ) -> Result<(), RegistryError> {
        if self.get(descriptor.id).is_some() || descriptor.id == OUT_TYPE {
            return Err(RegistryError::Duplicate(descriptor.id.to_string()));
        }
        tracing::trace!(id = descriptor.id, "ugen type registered");
        self.entries.push(RegistryEntry {
            descriptor,
            factory,
        });
        Ok(())
    }

    /// Returns descriptors for all registered types.
    pub fn all(&self) -> Vec<&UGenDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    /// Returns descriptors for types in `category`.
    pub fn in_category(&self, category: UGenCategory) -> Vec<&UGenDescriptor> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.category == category)
            .map(|e| &e.descriptor)
            .collect()
    }

    /// Get a descriptor by type id.
    pub fn get(&self, id: &str) -> Option<&UGenDescriptor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| &e.descriptor)
    }

    /// Constructor for a type id.
    pub fn constructor(&self, id: &str) -> Option<Constructor> {
        self.entries
            .iter()
            .find(|e| e.descriptor.id == id)
            .map(|e| Arc::clone(&e.factory))
    }

    /// Builds a UGen instance of type `id`.
    pub fn create(&self, id: &str, args: &[Arg]) -> Result<Box<dyn UGen>, RegistryError> {
        let factory = self
            .constructor(id)
            .ok_or_else(|| RegistryError::Unknown(id.to_string()))?;
        factory(args).map_err(|source| RegistryError::Construct {
            kind: id.to_string(),
            source,
        })
    }

    /// Builds a graph node of type `kind`.
    ///
    /// `out` nodes take their channel from the first argument. The UGen is
    /// not constructed until the graph is scheduled.
    pub fn node(
        &self,
        id: impl Into<NodeId>,
        kind: &str,
        args: Vec<Arg>,
    ) -> Result<Node, RegistryError> {
        if kind == OUT_TYPE {
            let channel = args.first().and_then(Arg::as_index).ok_or_else(|| {
                RegistryError::Construct {
                    kind: kind.to_string(),
                    source: UGenError::InvalidArgument(
                        "out needs a non-negative channel index".into(),
                    ),
                }
            })?;
            return Ok(Node::out(id, channel));
        }
        let factory = self
            .constructor(kind)
            .ok_or_else(|| RegistryError::Unknown(kind.to_string()))?;
        Ok(Node::new(id, kind, factory, args))
    }

    /// Host-side handle to every knob declared by `knob` nodes.
    pub fn knobs(&self) -> &KnobBus {
        &self.knobs
    }

    /// Returns the number of registered types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no types are registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for UGenRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UGenRegistry")
            .field("types", &self.entries.len())
            .field("knobs", &self.knobs.len())
            .finish()
    }
}

fn oscillator(shape: Shape) -> Constructor {
    constructor(move |args| Ok(Box::new(Oscillator::from_args(shape, args)?)))
}

fn knob(bus: &KnobBus, args: &[Arg]) -> Result<Box<dyn UGen>, UGenError> {
    let name = args
        .first()
        .and_then(Arg::as_str)
        .ok_or_else(|| UGenError::InvalidArgument("knob needs a name".into()))?;
    let default = number_or(args, 1, 0.0);
    let min = number_or(args, 2, 0.0);
    let max = number_or(args, 3, 1.0);
    if !(min <= max) {
        return Err(UGenError::InvalidArgument(format!(
            "knob '{name}' range [{min}, {max}] is empty"
        )));
    }
    let handle = bus.declare(name, default, min, max);
    Ok(Box::new(KnobReader::new(handle)))
}
