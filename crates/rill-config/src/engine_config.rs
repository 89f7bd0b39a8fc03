//! Engine settings file.

use std::path::Path;

use rill_core::pool::{MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};
use rill_engine::{DEFAULT_GAIN, RunnerConfig, default_workers};
use rill_io::{OutputConfig, SampleFormat};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::paths;

/// Lowest accepted sample rate in Hz.
pub const MIN_SAMPLE_RATE: u32 = 22_050;
/// Highest accepted sample rate in Hz.
pub const MAX_SAMPLE_RATE: u32 = 192_000;

/// Environment variables read by [`EngineConfig::apply_env`].
pub const ENV_OVERRIDES: &[&str] = &[
    "RILL_SAMPLE_RATE",
    "RILL_BUFFER_SIZE",
    "RILL_WORKERS",
    "RILL_GAIN",
];

/// Settings for the runner and output stage.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// block_size = 256
/// crossfade_ms = 50.0
/// gain = 0.3
/// sample_format = "s16"
/// device = "usb"
/// ```
///
/// Every key is optional.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// Worker threads per epoch; `None` picks half the CPUs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Crossfade length on graph swaps.
    pub crossfade_ms: f64,
    /// Initial master gain.
    pub gain: f64,
    /// Output channel count.
    pub channels: u16,
    /// Device sample type, `f32` or `s16`.
    pub sample_format: String,
    /// Device queue threshold in blocks.
    pub queue_blocks: usize,
    /// Runner to output stage channel depth.
    pub channel_capacity: usize,
    /// Output device name filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            block_size: 128,
            workers: None,
            crossfade_ms: 100.0,
            gain: DEFAULT_GAIN,
            channels: 2,
            sample_format: SampleFormat::F32.name().to_string(),
            queue_blocks: 1,
            channel_capacity: 4,
            device: None,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file and normalize.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse TOML text and normalize.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        config.normalized()
    }

    /// Loads `path`, or the user config file if present, or the defaults;
    /// then applies environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => {
                let user = paths::config_file_path();
                if user.is_file() {
                    tracing::debug!(path = %user.display(), "loading user config");
                    Self::load(&user)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env();
        config.normalized()
    }

    /// Save as TOML, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
        std::fs::write(path, self.to_toml()?).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Serialize to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Applies `RILL_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value. Unparsable values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parse<T: std::str::FromStr>(key: &str, raw: &str) -> Option<T> {
            let parsed = raw.trim().parse().ok();
            if parsed.is_none() {
                tracing::warn!(key, value = raw, "ignoring unparsable override");
            }
            parsed
        }

        if let Some(raw) = lookup("RILL_SAMPLE_RATE")
            && let Some(v) = parse("RILL_SAMPLE_RATE", &raw)
        {
            self.sample_rate = v;
        }
        if let Some(raw) = lookup("RILL_BUFFER_SIZE")
            && let Some(v) = parse("RILL_BUFFER_SIZE", &raw)
        {
            self.block_size = v;
        }
        if let Some(raw) = lookup("RILL_WORKERS")
            && let Some(v) = parse("RILL_WORKERS", &raw)
        {
            self.workers = Some(v);
        }
        if let Some(raw) = lookup("RILL_GAIN")
            && let Some(v) = parse("RILL_GAIN", &raw)
        {
            self.gain = v;
        }
    }

    /// Clamps ranged settings and rejects ones that cannot be repaired.
    pub fn normalized(mut self) -> Result<Self, ConfigError> {
        self.sample_rate = self.sample_rate.clamp(MIN_SAMPLE_RATE, MAX_SAMPLE_RATE);
        self.block_size = self
            .block_size
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or(MAX_BLOCK_SIZE)
            .clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
        self.gain = if self.gain.is_nan() {
            DEFAULT_GAIN
        } else {
            self.gain.clamp(0.0, 1.0)
        };

        if self.workers == Some(0) {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        if self.channels == 0 {
            return Err(ConfigError::invalid("channels", "must be at least 1"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid("channel_capacity", "must be at least 1"));
        }
        if !self.crossfade_ms.is_finite() || self.crossfade_ms < 0.0 {
            return Err(ConfigError::invalid(
                "crossfade_ms",
                format!("{} is not a non-negative duration", self.crossfade_ms),
            ));
        }
        let format = self.format()?;
        self.sample_format = format.name().to_string();
        Ok(self)
    }

    /// Parsed sample format.
    pub fn format(&self) -> Result<SampleFormat, ConfigError> {
        self.sample_format
            .parse()
            .map_err(|e: rill_io::Error| ConfigError::invalid("sample_format", e.to_string()))
    }

    /// Settings for the runner.
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            workers: self.workers.unwrap_or_else(default_workers),
            crossfade_ms: self.crossfade_ms,
            channels: self.channels as usize,
            channel_capacity: self.channel_capacity,
            gain: self.gain,
        }
    }

    /// Settings for the output stage.
    pub fn output_config(&self) -> Result<OutputConfig, ConfigError> {
        Ok(OutputConfig {
            sample_rate: self.sample_rate,
            block_size: self.block_size,
            channels: self.channels,
            format: self.format()?,
            queue_blocks: self.queue_blocks,
            silence_on_timeout: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.sample_rate, 44_100);
        assert_eq!(config.block_size, 128);
        assert_eq!(config.crossfade_ms, 100.0);
        assert_eq!(config.gain, 0.25);
        assert_eq!(config.channels, 2);
        assert_eq!(config.queue_blocks, 1);
        assert_eq!(config.channel_capacity, 4);
        assert!(config.workers.is_none());
        assert_eq!(config.format().unwrap(), SampleFormat::F32);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let config = EngineConfig::from_toml("gain = 0.5").unwrap();
        assert_eq!(config.gain, 0.5);
        assert_eq!(config.sample_rate, 44_100);
    }

    #[test]
    fn test_clamping() {
        let config = EngineConfig::from_toml(
            "sample_rate = 8000\nblock_size = 100\ngain = 3.0",
        )
        .unwrap();
        assert_eq!(config.sample_rate, MIN_SAMPLE_RATE);
        assert_eq!(config.block_size, 128);
        assert_eq!(config.gain, 1.0);

        let config = EngineConfig::from_toml("sample_rate = 500000\nblock_size = 3").unwrap();
        assert_eq!(config.sample_rate, MAX_SAMPLE_RATE);
        assert_eq!(config.block_size, MIN_BLOCK_SIZE);

        let config = EngineConfig::from_toml("block_size = 100000").unwrap();
        assert_eq!(config.block_size, MAX_BLOCK_SIZE);
    }

    #[test]
    fn test_rejects_unrepairable_values() {
        assert!(matches!(
            EngineConfig::from_toml("channels = 0"),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "channels"
        ));
        assert!(matches!(
            EngineConfig::from_toml("sample_format = \"u8\""),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "sample_format"
        ));
        assert!(matches!(
            EngineConfig::from_toml("crossfade_ms = -1.0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml("workers = 0"),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            EngineConfig::from_toml("gain = \"loud\""),
            Err(ConfigError::TomlParse(_))
        ));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("RILL_SAMPLE_RATE", "48000"),
            ("RILL_BUFFER_SIZE", "512"),
            ("RILL_WORKERS", "3"),
            ("RILL_GAIN", "not-a-number"),
        ]
        .into_iter()
        .collect();
        let mut config = EngineConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.sample_rate, 48_000);
        assert_eq!(config.block_size, 512);
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.gain, DEFAULT_GAIN);
    }

    #[test]
    fn test_derived_configs() {
        let config = EngineConfig {
            workers: Some(3),
            sample_format: "s16".into(),
            ..Default::default()
        };
        let runner = config.runner_config();
        assert_eq!(runner.workers, 3);
        assert_eq!(runner.block_size, 128);
        assert!(runner.validate().is_ok());

        let output = config.output_config().unwrap();
        assert_eq!(output.format, SampleFormat::S16);
        assert_eq!(output.channels, 2);
        assert!(output.silence_on_timeout);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = EngineConfig {
            device: Some("usb".into()),
            ..Default::default()
        };
        let parsed = EngineConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
