//! Error types for epoch construction and the runner.

use rill_core::{GraphError, NodeId, PoolError, UGenError};

/// Failure while turning a [`Graph`](rill_core::Graph) into a runnable epoch.
///
/// None of these leave the runner in a different state: the previously
/// running epoch keeps playing and no UGen of the failed epoch is stopped.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    /// The graph failed validation.
    #[error("invalid graph: {0}")]
    Graph(#[from] GraphError),

    /// A node's constructor rejected its arguments.
    #[error("cannot construct node '{node}': {source}")]
    Construct {
        /// Offending node.
        node: NodeId,
        /// Constructor error.
        #[source]
        source: UGenError,
    },

    /// A freshly constructed UGen failed to start.
    #[error("node '{node}' failed to start: {source}")]
    UGenStartFailed {
        /// Offending node.
        node: NodeId,
        /// Start error.
        #[source]
        source: UGenError,
    },

    /// The configured block size is not accepted by the pool.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[source] std::io::Error),
}

/// Errors surfaced by [`Runner`](crate::Runner) and [`Epoch`](crate::Epoch).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A new graph could not be built; the old one keeps playing.
    #[error("epoch construction failed: {0}")]
    EpochConstructionFailed(#[from] ConstructionError),

    /// A UGen panicked inside `generate`; its block was replaced with silence.
    #[error("ugen '{node}' panicked during generate")]
    GenPanicked {
        /// Offending node.
        node: NodeId,
    },

    /// The runner was cancelled.
    #[error("runner cancelled")]
    Cancelled,

    /// [`RunnerConfig`](crate::RunnerConfig) is out of range.
    #[error("invalid runner configuration: {0}")]
    InvalidConfig(String),

    /// The driver thread could not be spawned.
    #[error("failed to spawn driver thread: {0}")]
    Spawn(#[source] std::io::Error),
}
