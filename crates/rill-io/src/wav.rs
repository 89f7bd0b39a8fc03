//! WAV-file output device.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use hound::{SampleFormat as HoundFormat, WavWriter};

use crate::device::{AudioDevice, DeviceSpec, Interleaved, SampleFormat};
use crate::{Error, Result};

/// Writes everything queued to a WAV file.
///
/// The file never backs up, so an output stage writing here runs as fast
/// as the graph renders. `f32` specs produce IEEE float files and `s16`
/// specs produce 16-bit PCM.
pub struct WavDevice {
    path: PathBuf,
    name: String,
    writer: Option<WavWriter<BufWriter<File>>>,
    frames: u64,
    channels: u16,
}

impl WavDevice {
    /// Creates a device that will write to `path` when opened.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            name: path.display().to_string(),
            path,
            writer: None,
            frames: 0,
            channels: 0,
        }
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sample frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.frames
    }
}

impl std::fmt::Debug for WavDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WavDevice")
            .field("path", &self.path)
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

impl AudioDevice for WavDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, spec: &DeviceSpec) -> Result<()> {
        let (bits_per_sample, sample_format) = match spec.format {
            SampleFormat::F32 => (32, HoundFormat::Float),
            SampleFormat::S16 => (16, HoundFormat::Int),
        };
        let hound_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample,
            sample_format,
        };
        self.writer = Some(WavWriter::create(&self.path, hound_spec)?);
        self.channels = spec.channels.max(1);
        self.frames = 0;
        tracing::info!(path = %self.path.display(), format = %spec.format, "wav output opened");
        Ok(())
    }

    fn queue(&mut self, samples: Interleaved<'_>) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::NotOpen(self.name.clone()))?;
        match samples {
            Interleaved::F32(s) => {
                for &sample in s {
                    writer.write_sample(sample)?;
                }
            }
            Interleaved::S16(s) => {
                for &sample in s {
                    writer.write_sample(sample)?;
                }
            }
        }
        self.frames += (samples.len() / self.channels as usize) as u64;
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        0
    }

    fn close(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
            tracing::info!(
                path = %self.path.display(),
                frames = self.frames,
                "wav output finalized"
            );
        }
        Ok(())
    }
}

impl Drop for WavDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to finalize wav output");
        }
    }
}
