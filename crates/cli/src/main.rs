//! AgentMesh CLI — the main entry point.
//!
//! Commands:
//! - `serve` — build the configured pipeline and expose it as an agent
//! - `check` — validate configuration and construct the pipeline, then exit

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use agentmesh_agents::{Registry, Runner};
use agentmesh_config::AppConfig;
use agentmesh_remote::AgentDescriptor;
use agentmesh_server::ServerState;

#[derive(Parser)]
#[command(
    name = "agentmesh",
    about = "AgentMesh — composable local/remote agent pipelines",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the configured pipeline as a remote-composable agent
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, env = "AGENT_CONFIG")]
        config: PathBuf,

        /// Override the bind host
        #[arg(long)]
        host: Option<String>,

        /// Override the bind port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration and build the pipeline, then exit
    Check {
        /// Path to the TOML configuration file
        #[arg(short, long, env = "AGENT_CONFIG")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Serve { config, host, port } => serve(config, host, port).await,
        Commands::Check { config } => check(config).await,
    }
}

/// Build the pipeline and its capability card from configuration.
///
/// Every construction-time check lives behind this call: agent ids,
/// kind tags, model resolution, gateway reachability. A failure here
/// means the process refuses to start.
async fn build_runner(
    config: &AppConfig,
) -> Result<(Arc<Runner>, AgentDescriptor), Box<dyn std::error::Error>> {
    let root_config = config
        .agents
        .first()
        .ok_or("configuration declares no agents")?;

    let mut card = AgentDescriptor::new(
        root_config.name.clone(),
        root_config.description.clone().unwrap_or_default(),
        format!("http://{}:{}/", config.serve.host, config.serve.port),
    );
    card.skills = root_config.skills.clone();

    let registry = Registry::with_builtins();
    let root = registry.build_pipeline(&config.agents, config).await?;
    let runner = Arc::new(Runner::new(root.name().to_string(), root));

    Ok((runner, card))
}

async fn serve(
    path: PathBuf,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load(&path)?;
    if let Some(host) = host {
        config.serve.host = host;
    }
    if let Some(port) = port {
        config.serve.port = port;
    }

    let (runner, card) = build_runner(&config).await?;
    let state = ServerState::new(runner, card);
    agentmesh_server::serve(state, &config.serve.host, config.serve.port).await
}

async fn check(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(&path)?;
    let (runner, card) = build_runner(&config).await?;
    println!(
        "OK: pipeline '{}' ({} declared agent(s)), served as '{}'",
        runner.root().name(),
        config.agents.len(),
        card.name
    );
    Ok(())
}
