//! Core data model for the rill audio graph runtime.
//!
//! This crate holds everything the scheduler consumes but nothing that runs
//! threads of its own:
//!
//! - [`pool`]: size-classed recycling of sample [`Block`]s
//! - [`ugen`]: the [`UGen`] trait, input maps and constructors
//! - [`ugens`]: built-in generators, including the [`OutMix`](ugens::OutMix) sink mixer
//! - [`graph`]: immutable [`Graph`] snapshots and their builder
//! - [`align`]: node identity between successive graphs
//! - [`control`]: lock-free gain and knob values
//! - [`cancel`]: cooperative cancellation
//!
//! # Example
//!
//! ```rust
//! use rill_core::{Graph, align};
//!
//! let before = Graph::builder()
//!     .sine("osc", 440.0)
//!     .out("l", 0)
//!     .edge("osc", "l", "in")
//!     .build()
//!     .unwrap();
//! let after = Graph::builder()
//!     .sine("osc2", 440.0)
//!     .out("l2", 0)
//!     .edge("osc2", "l2", "in")
//!     .build()
//!     .unwrap();
//!
//! let identities = align(&before, &after);
//! assert_eq!(identities.get(&"osc2".into()), Some(&"osc".into()));
//! ```

pub mod align;
pub mod arg;
pub mod cancel;
pub mod control;
pub mod graph;
pub mod pool;
pub mod ugen;
pub mod ugens;

pub use align::{Alignment, align};
pub use arg::Arg;
pub use cancel::CancelToken;
pub use control::{GainControl, Knob, KnobBus};
pub use graph::{Edge, Graph, GraphBuilder, GraphError, Node, NodeId};
pub use pool::{Block, BlockPool, PoolError};
pub use ugen::{Constructor, Context, Inputs, SampleConfig, UGen, UGenError, constructor};
