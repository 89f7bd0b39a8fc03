//! Output stage and audio devices for the rill graph runtime.
//!
//! This crate provides:
//!
//! - **Output stage**: [`OutputStage`] drains frames from a runner, ramps the
//!   master gain, interleaves channels and throttles to the device
//! - **Devices**: the [`AudioDevice`] trait with a cpal-backed [`CpalDevice`],
//!   a WAV-file [`WavDevice`] and an in-memory [`MemoryDevice`]
//! - **Discovery**: [`list_devices`] enumerates output devices
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use rill_core::BlockPool;
//! use rill_engine::{Runner, RunnerConfig};
//! use rill_io::{CpalDevice, OutputConfig, OutputStage};
//!
//! let (runner, frames) = Runner::new(RunnerConfig::default(), Arc::new(BlockPool::new()))?;
//! let mut stage = OutputStage::new(
//!     OutputConfig::default(),
//!     Box::new(CpalDevice::new(None)),
//!     frames,
//!     runner.gain_control(),
//!     runner.cancel_token(),
//! );
//! stage.run()?;
//! ```

mod cpal_device;
mod device;
mod output;
mod wav;

pub use cpal_device::{CpalDevice, list_devices};
pub use device::{
    AudioDevice, Captured, DeviceInfo, DeviceSpec, Interleaved, MemoryCapture, MemoryDevice,
    SampleFormat,
};
pub use output::{GainRamp, OutputConfig, OutputStage, OutputStats, Step, interleave};
pub use wav::WavDevice;

/// Error types for audio output.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// WAV file write error.
    #[error("WAV file error: {0}")]
    Wav(#[from] hound::Error),

    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The requested sample format is not supported.
    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Samples were queued before `open` or after `close`.
    #[error("Device '{0}' is not open")]
    NotOpen(String),

    /// No frame arrived in time; the device was given silence.
    #[error("Device underrun after {0} ms without a frame")]
    DeviceUnderrun(u64),

    /// The output stage was cancelled.
    #[error("Output cancelled")]
    Cancelled,

    /// Standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for audio output operations.
pub type Result<T> = std::result::Result<T, Error>;
