//! Realtime playback command.

use std::io::BufRead;
use std::sync::{Arc, Weak};

use anyhow::Context;
use clap::Args;
use rill_config::resolve_patch;
use rill_core::BlockPool;
use rill_engine::Runner;
use rill_io::{CpalDevice, OutputStage};
use rill_registry::UGenRegistry;

use super::common::{EngineArgs, format_time, load_graph};

#[derive(Args)]
pub struct PlayArgs {
    /// Patch name or path to a patch file
    patch: String,

    #[command(flatten)]
    engine: EngineArgs,

    /// Output device (fuzzy name match)
    #[arg(short, long)]
    device: Option<String>,

    /// Ignore commands on stdin
    #[arg(long)]
    no_control: bool,
}

pub fn run(args: PlayArgs) -> anyhow::Result<()> {
    let mut config = args.engine.resolve()?;
    if args.device.is_some() {
        config.device = args.device.clone();
    }

    let registry = Arc::new(UGenRegistry::new());
    let (patch, graph) = load_graph(&args.patch, &registry)?;

    let pool = Arc::new(BlockPool::new());
    let (runner, frames) = Runner::new(config.runner_config(), Arc::clone(&pool))?;
    let runner = Arc::new(runner);
    runner
        .set_graph(graph)
        .with_context(|| format!("cannot start patch '{}'", patch.display_name()))?;

    let cancel = runner.cancel_token();
    {
        let cancel = cancel.clone();
        ctrlc::set_handler(move || cancel.cancel()).context("cannot install Ctrl+C handler")?;
    }

    let device = CpalDevice::new(config.device.clone());
    let mut stage = OutputStage::new(
        config.output_config()?,
        Box::new(device),
        frames,
        runner.gain_control(),
        cancel,
    )
    .with_pool(pool);
    stage.open()?;

    println!("Playing: {}", patch.display_name());
    println!("Device: {}", stage.device().name());
    println!(
        "Engine: {} Hz, {} frames/block, {} workers, gain {:.2}",
        config.sample_rate,
        config.block_size,
        runner.config().workers,
        config.gain
    );
    if !args.no_control {
        println!("Commands: r (reload), g <gain>, k <knob> <value>, s (stats), q (quit)");
        spawn_control(args.patch.clone(), patch.content_hash(), Arc::downgrade(&runner), registry);
    }
    println!("Press Ctrl+C to stop");

    let output = stage.run()?;
    runner.cancel();

    let stats = runner.stats();
    let played = output.blocks as f64 * config.block_size as f64 / f64::from(config.sample_rate);
    println!();
    println!("Stopped after {}", format_time(played));
    println!(
        "  {} blocks, {} underruns, {} swaps, {} crossfades, {} panics",
        output.blocks, output.underruns, stats.swaps, stats.crossfades, stats.gen_panics
    );

    match Arc::try_unwrap(runner) {
        Ok(runner) => runner.shutdown(),
        Err(_) => tracing::debug!("control thread still holds the runner; dropping"),
    }
    Ok(())
}

/// Reads line commands from stdin until EOF, `q`, or the runner is gone.
fn spawn_control(name: String, mut hash: u64, runner: Weak<Runner>, registry: Arc<UGenRegistry>) {
    let spawned = std::thread::Builder::new()
        .name("rill-control".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let Some(runner) = runner.upgrade() else { break };
                let words: Vec<&str> = line.split_whitespace().collect();
                match words.as_slice() {
                    [] => {}
                    ["q" | "quit"] => {
                        runner.cancel();
                        break;
                    }
                    ["r" | "reload"] => reload(&name, &mut hash, &runner, &registry),
                    ["g" | "gain", value] => match value.parse::<f64>() {
                        Ok(gain) => {
                            runner.set_gain(gain);
                            println!("gain {:.2}", runner.gain_control().get());
                        }
                        Err(_) => eprintln!("not a number: {value}"),
                    },
                    ["k" | "knob", knob, value] => match value.parse::<f64>() {
                        Ok(v) if registry.knobs().set(knob, v) => {}
                        Ok(_) => eprintln!(
                            "unknown knob '{knob}'; known: {}",
                            registry.knobs().names().join(", ")
                        ),
                        Err(_) => eprintln!("not a number: {value}"),
                    },
                    ["s" | "stats"] => println!("{:?}", runner.stats()),
                    _ => eprintln!("unknown command: {line}"),
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!(error = %e, "cannot spawn control thread");
    }
}

fn reload(name: &str, hash: &mut u64, runner: &Runner, registry: &UGenRegistry) {
    let patch = match resolve_patch(name) {
        Ok(patch) => patch,
        Err(e) => {
            eprintln!("reload failed: {e}");
            return;
        }
    };
    let new_hash = patch.content_hash();
    if new_hash == *hash {
        println!("patch unchanged");
        return;
    }
    let result = patch
        .to_graph(registry)
        .map_err(anyhow::Error::from)
        .and_then(|graph| runner.set_graph(graph).map_err(anyhow::Error::from));
    match result {
        Ok(()) => {
            *hash = new_hash;
            println!("reloaded {}", patch.display_name());
        }
        Err(e) => eprintln!("reload failed, keeping current graph: {e:#}"),
    }
}
