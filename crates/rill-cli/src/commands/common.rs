//! Shared CLI helpers used across multiple commands.

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use rill_config::{EngineConfig, Patch, resolve_patch};
use rill_core::Graph;
use rill_registry::UGenRegistry;

/// Engine options shared by `play` and `render`.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Engine settings file (defaults to the user config, then built-ins)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Master gain in [0, 1]
    #[arg(short, long)]
    pub gain: Option<f64>,

    /// Worker threads per epoch
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Frames per block
    #[arg(long)]
    pub block_size: Option<usize>,
}

impl EngineArgs {
    /// Resolves settings: file, then environment, then command line.
    pub fn resolve(&self) -> anyhow::Result<EngineConfig> {
        let mut config = EngineConfig::resolve(self.config.as_deref())?;
        if let Some(gain) = self.gain {
            config.gain = gain;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        Ok(config.normalized()?)
    }
}

/// Loads a patch by name or path and resolves it into a graph.
pub fn load_graph(name: &str, registry: &UGenRegistry) -> anyhow::Result<(Patch, Graph)> {
    let patch = resolve_patch(name).with_context(|| {
        format!("cannot load patch '{name}'; factory patches: {}", rill_config::FACTORY_PATCH_NAMES.join(", "))
    })?;
    let graph = patch
        .to_graph(registry)
        .with_context(|| format!("patch '{}' is invalid", patch.display_name()))?;
    Ok((patch, graph))
}

/// Formats seconds as `m:ss.s`.
pub fn format_time(seconds: f64) -> String {
    let minutes = (seconds / 60.0).floor();
    format!("{}:{:04.1}", minutes as u64, seconds - minutes * 60.0)
}
