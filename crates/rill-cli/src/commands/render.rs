//! Offline rendering to WAV.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use rill_core::BlockPool;
use rill_engine::Runner;
use rill_io::{OutputStage, SampleFormat, Step, WavDevice};
use rill_registry::UGenRegistry;

use super::common::{EngineArgs, format_time, load_graph};

#[derive(Args)]
pub struct RenderArgs {
    /// Patch name or path to a patch file
    patch: String,

    /// Output WAV file
    #[arg(short, long)]
    output: PathBuf,

    /// Duration in seconds
    #[arg(short, long, default_value = "5.0")]
    seconds: f64,

    /// Sample format: f32 or s16
    #[arg(short, long)]
    format: Option<SampleFormat>,

    #[command(flatten)]
    engine: EngineArgs,
}

/// Number of blocks covering `seconds`, rounded up.
fn total_blocks(seconds: f64, sample_rate: u32, block_size: usize) -> u64 {
    (seconds * f64::from(sample_rate) / block_size as f64).ceil() as u64
}

pub fn run(args: RenderArgs) -> anyhow::Result<()> {
    if !(args.seconds.is_finite() && args.seconds > 0.0) {
        anyhow::bail!("--seconds must be positive, got {}", args.seconds);
    }
    let mut config = args.engine.resolve()?;
    if let Some(format) = args.format {
        config.sample_format = format.name().to_string();
    }

    let registry = UGenRegistry::new();
    let (patch, graph) = load_graph(&args.patch, &registry)?;

    let pool = Arc::new(BlockPool::new());
    let (runner, frames) = Runner::new(config.runner_config(), Arc::clone(&pool))?;
    runner
        .set_graph(graph)
        .with_context(|| format!("cannot start patch '{}'", patch.display_name()))?;

    let mut output = config.output_config()?;
    output.silence_on_timeout = false;
    let mut stage = OutputStage::new(
        output,
        Box::new(WavDevice::new(&args.output)),
        frames,
        runner.gain_control(),
        runner.cancel_token(),
    )
    .with_pool(pool);
    stage
        .open()
        .with_context(|| format!("cannot create {}", args.output.display()))?;

    let total = total_blocks(args.seconds, config.sample_rate, config.block_size);
    println!(
        "Rendering {} ({}) to {}",
        patch.display_name(),
        format_time(args.seconds),
        args.output.display()
    );

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks ({eta})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );

    for _ in 0..total {
        match stage.step()? {
            Step::Played | Step::Underrun => pb.inc(1),
            Step::Finished => break,
        }
    }
    pb.finish_and_clear();

    stage.close()?;
    let stats = runner.stats();
    runner.shutdown();

    let blocks = stage.stats().blocks;
    println!(
        "Wrote {} frames ({} channels, {}) in {} blocks",
        blocks * config.block_size as u64,
        config.channels,
        config.sample_format,
        blocks
    );
    if stats.gen_panics > 0 || stats.non_finite_blocks > 0 {
        println!(
            "  warning: {} ugen panics, {} non-finite blocks zapped",
            stats.gen_panics, stats.non_finite_blocks
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_blocks_rounds_up() {
        assert_eq!(total_blocks(1.0, 1000, 100), 10);
        assert_eq!(total_blocks(1.0, 1000, 128), 8);
        assert_eq!(total_blocks(0.001, 44100, 128), 1);
    }
}
