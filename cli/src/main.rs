//! CLI for tint
//!
//! Drives the filter module from the command line:
//! - apply: filter an image file
//! - inspect: show what a filter module exports
//! - session: replay control changes through a live filter session
//! - capture: filter a camera still (with the `camera` feature)

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "tint")]
#[command(about = "tint - image filters through a WebAssembly module", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./tint.toml if present)
    #[arg(long, global = true, env = "TINT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Filter an image file
    Apply(commands::apply::ApplyArgs),

    /// Show the exports and memory of a filter module
    Inspect(commands::inspect::InspectArgs),

    /// Replay control changes through a filter session
    Session(commands::session::SessionArgs),

    /// Filter a still from a camera
    #[cfg(feature = "camera")]
    Capture(commands::capture::CaptureArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Apply(args) => commands::apply::run(&config, args).await,
        Commands::Inspect(args) => commands::inspect::run(&config, args).await,
        Commands::Session(args) => commands::session::run(&config, args).await,
        #[cfg(feature = "camera")]
        Commands::Capture(args) => commands::capture::run(&config, args).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
