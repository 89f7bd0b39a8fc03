//! The device interface the output stage writes to.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::{Error, Result};

/// Sample type a device consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// 32-bit float in `[-1, 1]`.
    #[default]
    F32,
    /// Signed 16-bit integer.
    S16,
}

impl SampleFormat {
    /// Size of one sample in bytes.
    pub const fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::F32 => 4,
            SampleFormat::S16 => 2,
        }
    }

    /// Lowercase name as used in config files.
    pub const fn name(self) -> &'static str {
        match self {
            SampleFormat::F32 => "f32",
            SampleFormat::S16 => "s16",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SampleFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "f32" | "float" => Ok(SampleFormat::F32),
            "s16" | "i16" => Ok(SampleFormat::S16),
            other => Err(Error::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Parameters passed to [`AudioDevice::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Interleaved channel count.
    pub channels: u16,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// Sample type.
    pub format: SampleFormat,
}

impl DeviceSpec {
    /// Bytes occupied by one second of audio.
    pub fn bytes_per_second(&self) -> usize {
        self.sample_rate as usize * self.channels as usize * self.format.bytes_per_sample()
    }

    /// Bytes occupied by one interleaved block.
    pub fn bytes_per_block(&self) -> usize {
        self.block_size * self.channels as usize * self.format.bytes_per_sample()
    }
}

/// One block of interleaved samples in the device's format.
#[derive(Debug, Clone, Copy)]
pub enum Interleaved<'a> {
    /// Float samples.
    F32(&'a [f32]),
    /// 16-bit samples.
    S16(&'a [i16]),
}

impl Interleaved<'_> {
    /// Number of samples (all channels).
    pub fn len(&self) -> usize {
        match self {
            Interleaved::F32(s) => s.len(),
            Interleaved::S16(s) => s.len(),
        }
    }

    /// Returns `true` if there are no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Interleaved::F32(s) => s.len() * 4,
            Interleaved::S16(s) => s.len() * 2,
        }
    }

    /// Sample format.
    pub fn format(&self) -> SampleFormat {
        match self {
            Interleaved::F32(_) => SampleFormat::F32,
            Interleaved::S16(_) => SampleFormat::S16,
        }
    }
}

/// Sink for interleaved audio.
///
/// The output stage calls `open` once, then `queue` once per block, polling
/// `queued_bytes` to pace itself, and finally `close`. Implementations must
/// accept `close` without a prior `open`.
pub trait AudioDevice: Send {
    /// Human-readable device name.
    fn name(&self) -> &str;

    /// Prepares the device for `spec`.
    fn open(&mut self, spec: &DeviceSpec) -> Result<()>;

    /// Hands one block of samples to the device.
    fn queue(&mut self, samples: Interleaved<'_>) -> Result<()>;

    /// Bytes accepted but not yet played.
    fn queued_bytes(&self) -> usize;

    /// Flushes and releases the device.
    fn close(&mut self) -> Result<()>;
}

/// Audio device information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Whether this is the host's default output.
    pub is_default: bool,
    /// Default sample rate in Hz.
    pub default_sample_rate: u32,
    /// Default channel count.
    pub channels: u16,
}

/// Everything a [`MemoryDevice`] has received.
#[derive(Debug, Default, Clone)]
pub struct Captured {
    /// Spec from the last `open`.
    pub spec: Option<DeviceSpec>,
    /// Float samples, interleaved.
    pub f32: Vec<f32>,
    /// 16-bit samples, interleaved.
    pub s16: Vec<i16>,
    /// Number of `queue` calls.
    pub blocks: usize,
    /// Whether `close` has been called.
    pub closed: bool,
}

/// Shared view of a [`MemoryDevice`]'s captured output.
#[derive(Debug, Clone, Default)]
pub struct MemoryCapture(Arc<Mutex<Captured>>);

impl MemoryCapture {
    /// Copy of everything captured so far.
    pub fn snapshot(&self) -> Captured {
        self.0.lock().clone()
    }

    /// Float samples of `channel`, de-interleaved.
    pub fn channel(&self, channel: usize) -> Vec<f32> {
        let captured = self.0.lock();
        let channels = captured.spec.map_or(1, |s| s.channels.max(1) as usize);
        captured
            .f32
            .iter()
            .skip(channel)
            .step_by(channels)
            .copied()
            .collect()
    }
}

/// Device that records into memory.
///
/// With a drain rate it also simulates playback, so `queued_bytes` reports
/// what a realtime device would still hold.
#[derive(Debug)]
pub struct MemoryDevice {
    capture: MemoryCapture,
    drain: Option<Drain>,
    open: bool,
}

#[derive(Debug)]
struct Drain {
    bytes_per_second: Option<usize>,
    started: Option<Instant>,
    total: usize,
}

impl MemoryDevice {
    /// Creates a device that never backs up.
    pub fn new() -> Self {
        Self {
            capture: MemoryCapture::default(),
            drain: None,
            open: false,
        }
    }

    /// Creates a device that plays at the opened spec's realtime rate.
    pub fn realtime() -> Self {
        Self {
            drain: Some(Drain {
                bytes_per_second: None,
                started: None,
                total: 0,
            }),
            ..Self::new()
        }
    }

    /// Creates a device that plays `bytes_per_second`.
    pub fn with_drain_rate(bytes_per_second: usize) -> Self {
        Self {
            drain: Some(Drain {
                bytes_per_second: Some(bytes_per_second),
                started: None,
                total: 0,
            }),
            ..Self::new()
        }
    }

    /// Handle for inspecting captured samples.
    pub fn capture(&self) -> MemoryCapture {
        self.capture.clone()
    }
}

impl Default for MemoryDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioDevice for MemoryDevice {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&mut self, spec: &DeviceSpec) -> Result<()> {
        let mut captured = self.capture.0.lock();
        captured.spec = Some(*spec);
        captured.closed = false;
        if let Some(drain) = &mut self.drain {
            drain.bytes_per_second.get_or_insert(spec.bytes_per_second());
            drain.started = None;
            drain.total = 0;
        }
        self.open = true;
        Ok(())
    }

    fn queue(&mut self, samples: Interleaved<'_>) -> Result<()> {
        if !self.open {
            return Err(Error::NotOpen(self.name().to_string()));
        }
        let mut captured = self.capture.0.lock();
        match samples {
            Interleaved::F32(s) => captured.f32.extend_from_slice(s),
            Interleaved::S16(s) => captured.s16.extend_from_slice(s),
        }
        captured.blocks += 1;
        if let Some(drain) = &mut self.drain {
            drain.started.get_or_insert_with(Instant::now);
            drain.total += samples.byte_len();
        }
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        let Some(drain) = &self.drain else {
            return 0;
        };
        let (Some(started), Some(rate)) = (drain.started, drain.bytes_per_second) else {
            return drain.total;
        };
        let played = (started.elapsed().as_secs_f64() * rate as f64) as usize;
        drain.total.saturating_sub(played)
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        self.capture.0.lock().closed = true;
        Ok(())
    }
}
