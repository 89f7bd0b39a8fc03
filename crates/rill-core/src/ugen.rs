//! The unit-generator contract.
//!
//! A [`UGen`] is a stateful block producer. The scheduler calls
//! [`UGen::generate`] once per tick with the current blocks of every
//! connected input port, and the UGen fills exactly one output block.
//!
//! # Lifecycle
//!
//! ```text
//! construct ──► start ──► generate × N ──► stop
//!                 │
//!                 └─ Err ──► epoch construction aborts; stop is never called
//! ```
//!
//! A UGen retained across a graph swap skips both `start` and `stop` in the
//! new epoch; its lifecycle simply continues.
//!
//! # Threading
//!
//! Any one instance is driven by at most one thread at a time, but successive
//! ticks may land on different worker threads. Implementations must be
//! `Send` and must not rely on thread-locals.

use std::sync::Arc;

use crate::arg::Arg;
use crate::cancel::CancelToken;

/// Errors raised while constructing or starting a UGen.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UGenError {
    /// A constructor argument was missing or had the wrong shape.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `start` could not acquire what the UGen needs.
    #[error("start failed: {0}")]
    Start(String),
}

/// Execution context handed to every UGen call.
#[derive(Debug, Clone, Default)]
pub struct Context {
    cancel: CancelToken,
}

impl Context {
    /// Creates a context observing `cancel`.
    pub fn new(cancel: CancelToken) -> Self {
        Self { cancel }
    }

    /// Returns `true` once the owning runner has been cancelled.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The underlying cancellation token.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Parses a positional port name (`$0`, `$1`, ...) into its index.
pub fn indexed_port(port: &str) -> Option<usize> {
    let digits = port.strip_prefix('$')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Input blocks for one `generate` call, keyed by port name.
///
/// Ports keep the order of the graph's edge list. Unconnected ports are
/// simply absent.
#[derive(Debug, Clone, Default)]
pub struct Inputs<'a> {
    ports: Vec<(&'a str, &'a [f64])>,
}

impl<'a> Inputs<'a> {
    /// Creates an empty input map.
    pub fn new() -> Self {
        Self { ports: Vec::new() }
    }

    /// Creates an empty input map with room for `n` ports.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            ports: Vec::with_capacity(n),
        }
    }

    /// Adds a connected port.
    pub fn insert(&mut self, port: &'a str, samples: &'a [f64]) {
        self.ports.push((port, samples));
    }

    /// Block connected to `port`, if any.
    pub fn get(&self, port: &str) -> Option<&'a [f64]> {
        self.ports
            .iter()
            .find(|(name, _)| *name == port)
            .map(|(_, samples)| *samples)
    }

    /// Returns `true` if `port` is connected.
    pub fn contains(&self, port: &str) -> bool {
        self.get(port).is_some()
    }

    /// All connected ports in edge order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a str, &'a [f64])> + '_ {
        self.ports.iter().copied()
    }

    /// Positional ports (`$k`) with their parsed index.
    pub fn indexed(&self) -> impl Iterator<Item = (usize, &'a [f64])> + '_ {
        self.ports
            .iter()
            .filter_map(|(name, samples)| indexed_port(name).map(|k| (k, *samples)))
    }

    /// Number of connected ports.
    pub fn len(&self) -> usize {
        self.ports.len()
    }

    /// Returns `true` when nothing is connected.
    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl<'a> FromIterator<(&'a str, &'a [f64])> for Inputs<'a> {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a [f64])>>(iter: I) -> Self {
        Self {
            ports: iter.into_iter().collect(),
        }
    }
}

/// Per-call configuration: process sample rate plus the input map.
#[derive(Debug, Clone)]
pub struct SampleConfig<'a> {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Input blocks keyed by port name.
    pub inputs: Inputs<'a>,
}

impl<'a> SampleConfig<'a> {
    /// Creates a config with the given sample rate and inputs.
    pub fn new(sample_rate: u32, inputs: Inputs<'a>) -> Self {
        Self {
            sample_rate,
            inputs,
        }
    }
}

/// A stateful per-block sample producer.
pub trait UGen: Send {
    /// Called once before the first [`generate`](Self::generate).
    fn start(&mut self, ctx: &Context) -> Result<(), UGenError> {
        let _ = ctx;
        Ok(())
    }

    /// Fills every sample of `out` for the current tick.
    fn generate(&mut self, ctx: &Context, cfg: &SampleConfig<'_>, out: &mut [f64]);

    /// Called once after the last [`generate`](Self::generate).
    fn stop(&mut self, ctx: &Context) {
        let _ = ctx;
    }
}

/// Builds a fresh UGen from literal arguments.
pub type Constructor = Arc<dyn Fn(&[Arg]) -> Result<Box<dyn UGen>, UGenError> + Send + Sync>;

/// Wraps a closure as a [`Constructor`].
pub fn constructor<F>(f: F) -> Constructor
where
    F: Fn(&[Arg]) -> Result<Box<dyn UGen>, UGenError> + Send + Sync + 'static,
{
    Arc::new(f)
}
