//! cpal-backed output device.
//!
//! [`CpalDevice`] opens a cpal output stream whose callback pulls from a
//! shared sample FIFO. [`AudioDevice::queue`] pushes to the FIFO; the
//! callback outputs zeros for whatever the FIFO cannot supply.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;

use crate::device::{AudioDevice, DeviceInfo, DeviceSpec, Interleaved, SampleFormat};
use crate::{Error, Result};

/// Extract device name via `description()` (cpal 0.17+).
fn device_name(device: &cpal::Device) -> std::result::Result<String, cpal::DeviceNameError> {
    device.description().map(|d| d.name().to_string())
}

/// List all output devices on the default host.
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host
        .default_output_device()
        .and_then(|d| device_name(&d).ok());
    let outputs = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;

    let mut devices = Vec::new();
    for device in outputs {
        let Ok(name) = device_name(&device) else {
            continue;
        };
        let (sample_rate, channels) = device
            .default_output_config()
            .map(|c| (c.sample_rate(), c.channels()))
            .unwrap_or((48000, 2));
        devices.push(DeviceInfo {
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            default_sample_rate: sample_rate,
            channels,
        });
    }
    Ok(devices)
}

/// Find an output device whose name contains `search` (case-insensitive),
/// or the default device.
fn find_output_device(host: &cpal::Host, search: Option<&str>) -> Result<cpal::Device> {
    let Some(search) = search else {
        return host.default_output_device().ok_or(Error::NoDevice);
    };
    let search_lower = search.to_lowercase();
    let devices = host
        .output_devices()
        .map_err(|e| Error::Stream(e.to_string()))?;
    for device in devices {
        if let Ok(name) = device_name(&device)
            && name.to_lowercase().contains(&search_lower)
        {
            return Ok(device);
        }
    }
    Err(Error::DeviceNotFound(format!(
        "no output device matching '{search}'"
    )))
}

/// Realtime output through cpal (ALSA, CoreAudio, WASAPI).
pub struct CpalDevice {
    search: Option<String>,
    name: String,
    fifo: Arc<Mutex<VecDeque<f32>>>,
    underruns: Arc<AtomicU64>,
    format: SampleFormat,
    stream: Option<cpal::Stream>,
}

impl CpalDevice {
    /// Creates a device that opens the output matching `search`, or the
    /// default output when `None`.
    pub fn new(search: Option<String>) -> Self {
        Self {
            name: search.clone().unwrap_or_else(|| "default".to_string()),
            search,
            fifo: Arc::new(Mutex::new(VecDeque::new())),
            underruns: Arc::new(AtomicU64::new(0)),
            format: SampleFormat::F32,
            stream: None,
        }
    }

    /// Number of callbacks that ran short of samples.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for CpalDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CpalDevice")
            .field("name", &self.name)
            .field("open", &self.stream.is_some())
            .finish_non_exhaustive()
    }
}

impl AudioDevice for CpalDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self, spec: &DeviceSpec) -> Result<()> {
        let host = cpal::default_host();
        let device = find_output_device(&host, self.search.as_deref())?;
        if let Ok(name) = device_name(&device) {
            self.name = name;
        }

        let stream_config = cpal::StreamConfig {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(spec.block_size as u32),
        };

        let fifo = Arc::clone(&self.fifo);
        let underruns = Arc::clone(&self.underruns);
        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut fifo = fifo.lock();
                    let available = fifo.len().min(data.len());
                    for (out, sample) in data.iter_mut().zip(fifo.drain(..available)) {
                        *out = sample;
                    }
                    if available < data.len() {
                        data[available..].fill(0.0);
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                |err| tracing::warn!(error = %err, "output stream error"),
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = %self.name,
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            format = %spec.format,
            "output stream started"
        );

        self.format = spec.format;
        self.fifo.lock().clear();
        self.stream = Some(stream);
        Ok(())
    }

    fn queue(&mut self, samples: Interleaved<'_>) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::NotOpen(self.name.clone()));
        }
        let mut fifo = self.fifo.lock();
        match samples {
            Interleaved::F32(s) => fifo.extend(s.iter().copied()),
            Interleaved::S16(s) => fifo.extend(s.iter().map(|&v| f32::from(v) / 32768.0)),
        }
        Ok(())
    }

    fn queued_bytes(&self) -> usize {
        self.fifo.lock().len() * self.format.bytes_per_sample()
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            tracing::info!(
                device = %self.name,
                underruns = self.underruns(),
                "output stream stopped"
            );
        }
        self.fifo.lock().clear();
        Ok(())
    }
}
