//! RapidFlow CLI
//!
//! Thin wrapper over the engine: run the server, run a pipeline from a
//! file, stop a pipeline, or list pipelines.

mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{handle_command, Commands};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rapidflow")]
#[command(about = "Self-hosted CI/CD engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rapidflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    handle_command(cli.command).await
}
