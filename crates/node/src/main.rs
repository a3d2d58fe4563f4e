// node/src/main.rs
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hopmesh-node")]
#[command(about = "Hop-based consensus and adaptive economics node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run the node until Ctrl-C
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,
    },

    /// Run a scripted end-to-end scenario and print the result as JSON
    Simulate {
        /// Configuration file path, defaults when absent
        #[arg(short, long)]
        config: Option<String>,

        /// Validators to register
        #[arg(short, long, default_value = "8")]
        validators: usize,

        /// Seed of the simulated transfer executor
        #[arg(short, long)]
        seed: Option<u64>,
    },

    /// Print the status of a freshly configured engine as JSON
    Status {
        /// Configuration file path, defaults when absent
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Init { config, force } => {
            init_config(&config, force)?;
        }
        Commands::Start { config } => {
            start_node(&config).await?;
        }
        Commands::Simulate { config, validators, seed } => {
            simulate(config.as_deref(), validators, seed)?;
        }
        Commands::Status { config } => {
            show_status(config.as_deref())?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&str>) -> anyhow::Result<node::NodeConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from {}", path);
            node::NodeConfig::from_file(path)
        }
        None => Ok(node::NodeConfig::default()),
    }
}

fn now() -> u64 {
    use mesh_core::Clock;
    mesh_core::SystemClock.now()
}

fn init_config(path: &str, force: bool) -> anyhow::Result<()> {
    if std::path::Path::new(path).exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", path);
    }

    let config = node::NodeConfig::default();
    config.to_file(path)?;

    tracing::info!("Default configuration written to {}", path);
    tracing::info!("Set engine.admin before starting the node");
    Ok(())
}

async fn start_node(config_path: &str) -> anyhow::Result<()> {
    use node::Node;
    use std::sync::Arc;

    let config = load_config(Some(config_path))?;
    let node = Arc::new(Node::new(config)?);
    node.clone().start().await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    node.stop().await?;
    tracing::info!("Node stopped gracefully");

    Ok(())
}

fn simulate(config_path: Option<&str>, validators: usize, seed: Option<u64>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    if seed.is_some() {
        config.engine.executor_seed = seed;
    }

    let report = node::simulation::run(&config, validators, now())?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show_status(config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let engine = node::HopMeshEngine::from_config(&config, now())?;
    println!("{}", serde_json::to_string_pretty(&engine.status()?)?);
    Ok(())
}
