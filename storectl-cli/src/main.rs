//! storectl - inspect and check console store configuration
//!
//! - `stores`: list the registered store implementations
//! - `show-config`: parse a console config and print the resolved connections
//! - `check`: start the configured store, ping every pool, shut it down

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use storectl_core::{ConsoleConfig, StoreRegistry};

mod commands;
mod tracing_setup;

use tracing_setup::{init_tracing, TracingConfig};

#[derive(Parser, Debug)]
#[command(
    name = "storectl",
    author,
    version,
    about = "Inspect and check console store configuration",
    long_about = "Resolve the store named in a console config, show the master and replica \
                  connections it would open, and verify they are reachable."
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG)
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List registered store names
    Stores,
    /// Print the master and replica connections from a config file
    ShowConfig(ShowConfigArgs),
    /// Initialize the configured store, ping it, then destroy it
    Check(CheckArgs),
}

#[derive(Args, Debug)]
struct ShowConfigArgs {
    /// Path to the console config file (YAML)
    #[arg(long, short = 'c', env = "STORECTL_CONFIG")]
    config: PathBuf,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct CheckArgs {
    /// Path to the console config file (YAML)
    #[arg(long, short = 'c', env = "STORECTL_CONFIG")]
    config: PathBuf,

    /// Start and stop the store without contacting the database
    #[arg(long)]
    skip_ping: bool,
}

/// Load the console config, then install tracing with its `logger.level`.
fn load_config(path: &Path, debug: bool) -> Result<ConsoleConfig> {
    let config = ConsoleConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    init_tracing(&TracingConfig {
        debug,
        level: config.logger.level.clone(),
    })?;
    Ok(config)
}

fn bootstrap_registry() -> Result<Arc<StoreRegistry>> {
    Ok(Arc::new(StoreRegistry::with_builtin_stores()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Tracing must be installed before the registry is built
    match cli.command {
        Commands::Stores => {
            init_tracing(&TracingConfig {
                debug: cli.debug,
                level: None,
            })?;
            commands::run_stores(&*bootstrap_registry()?)
        }
        Commands::ShowConfig(args) => {
            let config = load_config(&args.config, cli.debug)?;
            commands::run_show_config(&*bootstrap_registry()?, &config, args.json)
        }
        Commands::Check(args) => {
            let config = load_config(&args.config, cli.debug)?;
            commands::run_check(&*bootstrap_registry()?, &config, args.skip_ping).await
        }
    }
}
