//! Runner parameters.

use std::time::Duration;

use rill_core::pool::{DEFAULT_BLOCK_SIZE, is_valid_block_size};

use crate::error::EngineError;

/// Gain applied by the output stage until told otherwise.
pub const DEFAULT_GAIN: f64 = 0.25;

/// Static configuration of a [`Runner`](crate::Runner).
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Process sample rate in Hz.
    pub sample_rate: u32,
    /// Samples per tick; a power of two in `8..=2048`.
    pub block_size: usize,
    /// Worker threads per epoch, before capping at the node count.
    pub workers: usize,
    /// Length of the old/new crossfade on a graph swap.
    pub crossfade_ms: f64,
    /// Channel count used by [`Runner::silence`](crate::Runner::silence).
    pub channels: usize,
    /// Frames buffered between the runner and its consumer.
    pub channel_capacity: usize,
    /// Initial output gain.
    pub gain: f64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: DEFAULT_BLOCK_SIZE,
            workers: default_workers(),
            crossfade_ms: 100.0,
            channels: 2,
            channel_capacity: 4,
            gain: DEFAULT_GAIN,
        }
    }
}

/// Half the available cores, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

impl RunnerConfig {
    /// Number of ticks a crossfade spans: `ceil(ms * sr / 1000 / B)`.
    pub fn crossfade_ticks(&self) -> usize {
        if self.crossfade_ms.is_nan() || self.crossfade_ms <= 0.0 {
            return 0;
        }
        let samples = self.crossfade_ms * f64::from(self.sample_rate) / 1000.0;
        (samples / self.block_size as f64).ceil() as usize
    }

    /// Wall-clock length of one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate))
    }

    /// Checks ranges the runner depends on.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig("sample rate must be positive".into()));
        }
        if !is_valid_block_size(self.block_size) {
            return Err(EngineError::InvalidConfig(format!(
                "block size {} is not a power of two in 8..=2048",
                self.block_size
            )));
        }
        if self.channel_capacity == 0 {
            return Err(EngineError::InvalidConfig(
                "channel capacity must be at least 1".into(),
            ));
        }
        if !self.crossfade_ms.is_finite() || self.crossfade_ms < 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "crossfade of {} ms is not a non-negative duration",
                self.crossfade_ms
            )));
        }
        Ok(())
    }
}
