//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod list;
mod run;
mod server;
mod stop;

use anyhow::Result;
use clap::Subcommand;
use std::sync::Arc;

use rapidflow_engine::config::EngineConfig;
use rapidflow_engine::docker::DockerCli;
use rapidflow_engine::{db, Engine};
use rapidflow_providers::ProviderRegistry;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and job dispatcher
    Server,
    /// Run a pipeline from a config file (synchronous, no dispatcher)
    Run {
        /// Path to the pipeline config file (YAML, JSON, or TOML)
        #[arg(short, long)]
        file: String,
    },
    /// Stop a pipeline and clean up all of its resources
    Stop {
        /// Pipeline ID to stop
        #[arg(short, long)]
        id: i64,
    },
    /// List all pipelines
    List,
}

/// Handle a CLI command
pub async fn handle_command(command: Commands) -> Result<()> {
    match command {
        Commands::Server => server::run_server().await,
        Commands::Run { file } => run::run_pipeline(&file).await,
        Commands::Stop { id } => stop::stop_pipeline(id).await,
        Commands::List => list::list_pipelines().await,
    }
}

/// Assemble an engine over the configured database and the local docker
/// daemon, with all built-in providers registered.
pub(crate) async fn build_engine() -> Result<Engine> {
    let config = EngineConfig::from_env();
    config.validate()?;

    let pool = db::create_pool(&config.database_path).await?;
    db::run_migrations(&pool).await?;

    Ok(Engine::new(
        pool,
        Arc::new(DockerCli::new()),
        Arc::new(ProviderRegistry::with_defaults()),
        config,
    ))
}
