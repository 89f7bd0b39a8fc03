//! The output stage: frames in, interleaved device samples out.
//!
//! Each step takes one [`Frame`] from the runner (or synthesizes silence if
//! none arrives within a block duration), multiplies it by a gain ramped
//! linearly from the previous block's gain to the current target, interleaves
//! and converts it to the device format, queues it, and then sleeps while the
//! device holds more than `queue_blocks` blocks. That sleep is what paces the
//! whole graph to realtime.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, select};
use rill_core::{Block, BlockPool, CancelToken, GainControl};
use rill_engine::Frame;

use crate::device::{AudioDevice, DeviceSpec, Interleaved, SampleFormat};
use crate::{Error, Result};

/// Output stage configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// Device channel count.
    pub channels: u16,
    /// Device sample type.
    pub format: SampleFormat,
    /// Blocks the device may hold before the stage sleeps.
    pub queue_blocks: usize,
    /// Emit silence when no frame arrives within one block duration.
    ///
    /// Offline rendering turns this off so slow graphs never get gaps.
    pub silence_on_timeout: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            block_size: 128,
            channels: 2,
            format: SampleFormat::F32,
            queue_blocks: 1,
            silence_on_timeout: true,
        }
    }
}

impl OutputConfig {
    /// Spec handed to [`AudioDevice::open`].
    pub fn spec(&self) -> DeviceSpec {
        DeviceSpec {
            channels: self.channels,
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            format: self.format,
        }
    }

    /// Wall-clock length of one block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate.max(1)))
    }

    fn threshold_bytes(&self) -> usize {
        self.queue_blocks * self.spec().bytes_per_block()
    }
}

/// Master gain smoothing.
///
/// Within a block the gain moves linearly from its previous value to the
/// target, one step per sample, and lands exactly on the target at the
/// block boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainRamp {
    current: f64,
}

impl GainRamp {
    /// Starts at `initial`, clamped to `[0, 1]`.
    pub fn new(initial: f64) -> Self {
        Self {
            current: clamp_gain(initial),
        }
    }

    /// Gain at the start of the next block.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Fills `gains` with per-sample gains towards `target`.
    pub fn fill(&mut self, target: f64, gains: &mut [f64]) {
        let target = clamp_gain(target);
        if !gains.is_empty() {
            let step = (target - self.current) / gains.len() as f64;
            for (j, gain) in gains.iter_mut().enumerate() {
                *gain = self.current + step * j as f64;
            }
        }
        self.current = target;
    }
}

fn clamp_gain(gain: f64) -> f64 {
    if gain.is_nan() { 0.0 } else { gain.clamp(0.0, 1.0) }
}

/// Interleaves `blocks` into `out` as `device_channels` channels, scaling
/// sample `j` of every channel by `gains[j]`.
///
/// Channels missing from `blocks` are written as silence and extra blocks
/// are ignored.
pub fn interleave(blocks: &[Block], device_channels: usize, gains: &[f64], out: &mut Vec<f32>) {
    out.clear();
    out.reserve(gains.len() * device_channels);
    for (j, &gain) in gains.iter().enumerate() {
        for ch in 0..device_channels {
            let sample = blocks.get(ch).and_then(|b| b.get(j)).copied().unwrap_or(0.0);
            out.push((sample * gain) as f32);
        }
    }
}

#[inline]
fn to_s16(sample: f32) -> i16 {
    (sample * 32768.0).clamp(-32768.0, 32767.0) as i16
}

/// What one [`OutputStage::step`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A frame from the runner was played.
    Played,
    /// No frame arrived in time; silence was played.
    Underrun,
    /// The runner hung up.
    Finished,
}

/// Counters kept by an [`OutputStage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutputStats {
    /// Blocks queued to the device, silence included.
    pub blocks: u64,
    /// Silent blocks queued because no frame arrived.
    pub underruns: u64,
    /// Times the stage slept for the device to drain.
    pub throttled: u64,
    /// Frames whose channel count differed from the device's.
    pub channel_mismatches: u64,
}

/// Drains runner frames into an [`AudioDevice`].
pub struct OutputStage {
    config: OutputConfig,
    device: Box<dyn AudioDevice>,
    frames: Receiver<Frame>,
    gain: GainControl,
    cancel: CancelToken,
    pool: Option<Arc<BlockPool>>,
    ramp: GainRamp,
    gains: Vec<f64>,
    float_buf: Vec<f32>,
    int_buf: Vec<i16>,
    stats: OutputStats,
    open: bool,
}

enum Received {
    Frame(Frame),
    Timeout,
    Disconnected,
}

impl OutputStage {
    /// Creates a stage reading `frames` and writing to `device`.
    ///
    /// The gain ramp starts at the control's current value.
    pub fn new(
        config: OutputConfig,
        device: Box<dyn AudioDevice>,
        frames: Receiver<Frame>,
        gain: GainControl,
        cancel: CancelToken,
    ) -> Self {
        Self {
            ramp: GainRamp::new(gain.get()),
            gains: Vec::with_capacity(config.block_size),
            float_buf: Vec::with_capacity(config.block_size * config.channels as usize),
            int_buf: Vec::new(),
            config,
            device,
            frames,
            gain,
            cancel,
            pool: None,
            stats: OutputStats::default(),
            open: false,
        }
    }

    /// Returns played frames' blocks to `pool`.
    pub fn with_pool(mut self, pool: Arc<BlockPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Opens the device. Called by the first [`step`](Self::step) if needed.
    pub fn open(&mut self) -> Result<()> {
        if !self.open {
            self.device.open(&self.config.spec())?;
            self.open = true;
            tracing::debug!(device = self.device.name(), "output stage opened");
        }
        Ok(())
    }

    /// Plays one block.
    ///
    /// Returns [`Error::Cancelled`] once the cancel token fires.
    pub fn step(&mut self) -> Result<Step> {
        self.open()?;
        if self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let received = if self.config.silence_on_timeout {
            select! {
                recv(self.frames) -> msg => msg.map_or(Received::Disconnected, Received::Frame),
                recv(self.cancel.signal()) -> _ => return Err(Error::Cancelled),
                default(self.config.block_duration()) => Received::Timeout,
            }
        } else {
            select! {
                recv(self.frames) -> msg => msg.map_or(Received::Disconnected, Received::Frame),
                recv(self.cancel.signal()) -> _ => return Err(Error::Cancelled),
            }
        };

        match received {
            Received::Frame(frame) => {
                if frame.num_channels() != self.config.channels as usize {
                    if self.stats.channel_mismatches == 0 {
                        tracing::warn!(
                            frame = frame.num_channels(),
                            device = self.config.channels,
                            "frame channel count differs from device"
                        );
                    }
                    self.stats.channel_mismatches += 1;
                }
                let played = self.write(frame.channels(), frame.block_size());
                if let Some(pool) = &self.pool {
                    frame.recycle(pool);
                }
                played.map(|()| Step::Played)
            }
            Received::Timeout => {
                let waited = self.config.block_duration().as_millis() as u64;
                tracing::warn!(error = %Error::DeviceUnderrun(waited), "playing silence");
                self.stats.underruns += 1;
                self.write(&[], self.config.block_size)?;
                Ok(Step::Underrun)
            }
            Received::Disconnected => Ok(Step::Finished),
        }
    }

    fn write(&mut self, blocks: &[Block], len: usize) -> Result<()> {
        self.gains.resize(len, 0.0);
        self.ramp.fill(self.gain.get(), &mut self.gains);
        interleave(
            blocks,
            self.config.channels as usize,
            &self.gains,
            &mut self.float_buf,
        );

        match self.config.format {
            SampleFormat::F32 => self.device.queue(Interleaved::F32(&self.float_buf))?,
            SampleFormat::S16 => {
                self.int_buf.clear();
                self.int_buf
                    .extend(self.float_buf.iter().map(|&s| to_s16(s)));
                self.device.queue(Interleaved::S16(&self.int_buf))?;
            }
        }
        self.stats.blocks += 1;
        self.throttle()
    }

    /// Sleeps off whatever the device holds beyond the threshold.
    fn throttle(&mut self) -> Result<()> {
        let queued = self.device.queued_bytes();
        let threshold = self.config.threshold_bytes();
        if queued <= threshold {
            return Ok(());
        }
        let rate = self.config.spec().bytes_per_second().max(1);
        let wait = Duration::from_secs_f64((queued - threshold) as f64 / rate as f64);
        self.stats.throttled += 1;
        tracing::trace!(queued, threshold, ?wait, "throttling");
        if self.cancel.wait_timeout(wait) {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Steps until the runner hangs up or the stage is cancelled, then
    /// closes the device.
    pub fn run(&mut self) -> Result<OutputStats> {
        let result = loop {
            match self.step() {
                Ok(Step::Finished) | Err(Error::Cancelled) => break Ok(()),
                Ok(_) => {}
                Err(e) => break Err(e),
            }
        };
        let closed = self.close();
        result?;
        closed?;
        tracing::info!(
            blocks = self.stats.blocks,
            underruns = self.stats.underruns,
            "output stage finished"
        );
        Ok(self.stats)
    }

    /// Closes the device if it is open.
    pub fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.device.close()?;
        }
        Ok(())
    }

    /// Counters so far.
    pub fn stats(&self) -> OutputStats {
        self.stats
    }

    /// Configuration.
    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// The device being written to.
    pub fn device(&self) -> &dyn AudioDevice {
        self.device.as_ref()
    }
}

impl std::fmt::Debug for OutputStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStage")
            .field("device", &self.device.name())
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
