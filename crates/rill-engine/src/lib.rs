//! Parallel block scheduler and live graph swapping for rill.
//!
//! - [`Plan`]: pruning, bootstrap-edge detection and activation limits
//! - [`Epoch`]: one started graph with its own worker pool
//! - [`Runner`]: the driver thread, swaps, crossfades and subscribers
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use rill_core::{BlockPool, Graph};
//! use rill_engine::{Runner, RunnerConfig};
//!
//! let pool = Arc::new(BlockPool::new());
//! let (runner, frames) = Runner::new(RunnerConfig::default(), pool).unwrap();
//!
//! let graph = Graph::builder()
//!     .sine("osc", 440.0)
//!     .out("l", 0)
//!     .edge("osc", "l", "in")
//!     .build()
//!     .unwrap();
//! runner.set_graph(graph).unwrap();
//!
//! let frame = frames.recv().unwrap();
//! assert_eq!(frame.num_channels(), 1);
//! runner.shutdown();
//! ```

pub mod config;
pub mod epoch;
pub mod error;
pub mod frame;
pub mod plan;
pub mod runner;
pub mod stats;

pub use config::{DEFAULT_GAIN, RunnerConfig, default_workers};
pub use epoch::{Epoch, EpochEnv, EpochState, Prior};
pub use error::{ConstructionError, EngineError};
pub use frame::{Frame, crossfade_into};
pub use plan::{Plan, PlannedInput, PlannedNode};
pub use runner::Runner;
pub use stats::{Counters, RunnerStats};
