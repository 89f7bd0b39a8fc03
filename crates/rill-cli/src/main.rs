//! rill CLI - play, render and inspect rill patches.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rill")]
#[command(author, version, about = "Realtime modular synthesis graph runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a patch on an audio device until Ctrl+C
    Play(commands::play::PlayArgs),

    /// Render a patch to a WAV file
    Render(commands::render::RenderArgs),

    /// Validate a patch and print its schedule
    Check(commands::check::CheckArgs),

    /// List available ugen types
    Ugens(commands::ugens::UgensArgs),

    /// List output devices
    Devices(commands::devices::DevicesArgs),
}

fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level; log:: records are bridged.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => commands::play::run(args),
        Commands::Render(args) => commands::render::run(args),
        Commands::Check(args) => commands::check::run(args),
        Commands::Ugens(args) => commands::ugens::run(args),
        Commands::Devices(args) => commands::devices::run(args),
    }
}
