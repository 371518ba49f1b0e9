use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::MetricStoreBackend;
use super::constants::{
    ENV_ADVERTISE, ENV_CONFIG, ENV_DATA_DIR, ENV_DEBUG, ENV_FLUSH_PERIOD_SECS, ENV_HOST, ENV_PEERS,
    ENV_PORT, ENV_SHARDS, ENV_STORE_BACKEND,
};

#[derive(Parser)]
#[command(name = "spanline")]
#[command(version, about = "Distributed trace aggregation server", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Enable debug mode (verbose ingest logging)
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Address this node advertises to cluster peers (host:port)
    #[arg(long, global = true, env = ENV_ADVERTISE)]
    pub advertise: Option<String>,

    /// Comma-separated cluster peer addresses (host:port,host:port)
    #[arg(long, global = true, env = ENV_PEERS)]
    pub peers: Option<String>,

    /// Number of local aggregation shards
    #[arg(long, global = true, env = ENV_SHARDS)]
    pub shards: Option<usize>,

    /// Seconds between flush cycles
    #[arg(long, global = true, env = ENV_FLUSH_PERIOD_SECS)]
    pub flush_period_secs: Option<u64>,

    /// Metric store backend (memory or sqlite)
    #[arg(long, global = true, env = ENV_STORE_BACKEND, value_parser = parse_store_backend)]
    pub store_backend: Option<MetricStoreBackend>,

    /// Data directory for the durable store
    #[arg(long, global = true, env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,
}

/// Parse metric store backend from CLI/env string
fn parse_store_backend(s: &str) -> Result<MetricStoreBackend, String> {
    match s.to_lowercase().as_str() {
        "memory" => Ok(MetricStoreBackend::Memory),
        "sqlite" => Ok(MetricStoreBackend::Sqlite),
        _ => Err(format!(
            "Invalid store backend '{}'. Valid options: memory, sqlite",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete the local data directory. Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config: Option<PathBuf>,
    pub debug: bool,
    pub advertise: Option<String>,
    pub peers: Option<String>,
    pub shards: Option<usize>,
    pub flush_period_secs: Option<u64>,
    pub store_backend: Option<MetricStoreBackend>,
    pub data_dir: Option<PathBuf>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        config: cli.config,
        debug: cli.debug,
        advertise: cli.advertise,
        peers: cli.peers,
        shards: cli.shards,
        flush_period_secs: cli.flush_period_secs,
        store_backend: cli.store_backend,
        data_dir: cli.data_dir,
    };
    (config, cli.command)
}
