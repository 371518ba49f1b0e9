//! Core application

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::ApiServer;
use crate::cluster::{ClusterState, Forwarder, MetricRouter, ShardPool, StaticClusterProvider};
use crate::core::cli::{self, CliConfig, Commands, SystemCommands};
use crate::core::config::{self, AppConfig};
use crate::core::constants::{
    APP_NAME_LOWER, DISPATCH_CHANNEL_CAPACITY, ENV_LOG, FORWARD_TIMEOUT_SECS,
    RETRY_BUFFER_CAPACITY, RETRY_MAX_AGE_SECS, RETRY_MAX_ATTEMPTS, RETRY_RESOLVE_PERIOD_SECS,
    SHARD_CHANNEL_CAPACITY, TTL_SWEEP_PERIOD_SECS,
};
use crate::core::shutdown::ShutdownService;
use crate::data::StorageService;
use crate::resolve::MemoryRegistry;
use crate::tasks::watermark::WatermarkConfig;
use crate::tasks::{ingest, PersistenceTimer, SegmentIntake, TtlReaper, WatermarkService};

pub struct CoreApp {
    pub shutdown: ShutdownService,
    pub config: AppConfig,
    pub store: Arc<StorageService>,
    pub cluster: Arc<ClusterState>,
    pub shards: Arc<ShardPool>,
    pub registry: Arc<MemoryRegistry>,
    pub intake: Arc<SegmentIntake>,
    pub watermark: Arc<WatermarkService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        Self::init_logging();

        tracing::debug!("Application starting");

        let (cli_config, command) = cli::parse();
        tracing::trace!(command = ?command, "Parsed command");

        match command {
            Some(Commands::System {
                command: system_cmd,
            }) => {
                return Self::handle_system_command(system_cmd, &cli_config);
            }
            Some(Commands::Start) | None => {}
        }

        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli)?;

        let store = Arc::new(
            StorageService::init(config.storage.backend, &config.storage.data_dir)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to initialize metric store: {}", e))?,
        );
        tracing::debug!(backend = store.backend_name(), "Metric store initialized");

        let shutdown = ShutdownService::new(Arc::clone(&store));

        let provider = Arc::new(StaticClusterProvider::new(config.cluster.peers.clone()));
        let cluster = Arc::new(
            ClusterState::init(provider, config.cluster.advertise.clone()).await,
        );
        tracing::debug!(
            local = %cluster.local(),
            nodes = cluster.view().nodes.len(),
            "Cluster membership initialized"
        );

        let (shards, shard_handles) = ShardPool::start(
            config.cluster.shards,
            SHARD_CHANNEL_CAPACITY,
            shutdown.subscribe(),
        );
        let shards = Arc::new(shards);
        for handle in shard_handles {
            shutdown.register(handle).await;
        }

        let forwarder = Forwarder::new(Duration::from_secs(FORWARD_TIMEOUT_SECS))
            .context("Failed to build forwarding client")?;
        let router = Arc::new(MetricRouter::new(
            Arc::clone(&cluster),
            Arc::clone(&shards),
            forwarder,
        ));

        let registry = Arc::new(MemoryRegistry::new());

        let (dispatch_tx, dispatch_handle) = ingest::start_dispatch_task(
            Arc::clone(&router),
            DISPATCH_CHANNEL_CAPACITY,
            shutdown.subscribe(),
        );
        shutdown.register(dispatch_handle).await;

        let (retry_tx, retry_handle) = ingest::start_retry_task(
            Arc::clone(&registry) as _,
            dispatch_tx.clone(),
            RETRY_BUFFER_CAPACITY,
            RETRY_MAX_ATTEMPTS,
            Duration::from_secs(RETRY_MAX_AGE_SECS),
            Duration::from_secs(RETRY_RESOLVE_PERIOD_SECS),
            shutdown.subscribe(),
        );
        shutdown.register(retry_handle).await;

        let intake = Arc::new(SegmentIntake::new(
            Arc::clone(&registry) as _,
            dispatch_tx,
            retry_tx,
        ));

        let watermark = Arc::new(WatermarkService::new());

        Ok(Self {
            shutdown,
            config,
            store,
            cluster,
            shards,
            registry,
            intake,
            watermark,
        })
    }

    fn handle_system_command(cmd: SystemCommands, cli: &CliConfig) -> Result<()> {
        match cmd {
            SystemCommands::Prune { yes } => Self::prune_data(yes, cli),
        }
    }

    fn prune_data(skip_confirm: bool, cli: &CliConfig) -> Result<()> {
        let data_dir = cli
            .data_dir
            .clone()
            .unwrap_or_else(config::default_data_dir);

        if !data_dir.exists() {
            println!(
                "Nothing to prune. Data directory does not exist: {}",
                data_dir.display()
            );
            return Ok(());
        }

        let data_dir = data_dir.canonicalize().unwrap_or(data_dir);

        println!("This will permanently delete the local data directory:");
        println!("  {}", data_dir.display());
        println!();
        println!(
            "Make sure the server is not running. \
             Deleting data while the server is running will cause data corruption."
        );

        if !skip_confirm {
            print!("\nContinue? [y/N] ");
            std::io::Write::flush(&mut std::io::stdout())?;

            let mut input = String::new();
            std::io::stdin().read_line(&mut input)?;

            if !matches!(input.trim().to_lowercase().as_str(), "y" | "yes") {
                println!("Aborted.");
                return Ok(());
            }
        }

        std::fs::remove_dir_all(&data_dir)
            .with_context(|| format!("Failed to delete data directory: {}", data_dir.display()))?;
        println!("Pruned: {}", data_dir.display());
        Ok(())
    }

    fn init_logging() {
        let default_filter = format!("info,{}=info", APP_NAME_LOWER);

        let filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or(default_filter);

        tracing_subscriber::fmt()
            .with_target(false)
            .with_thread_ids(false)
            .with_level(true)
            .with_ansi(true)
            .compact()
            .with_env_filter(filter)
            .init();
    }

    async fn start_server(app: Self) -> Result<()> {
        // Install signal handlers FIRST (before any blocking calls)
        app.shutdown.install_signal_handlers();

        app.start_background_tasks().await;

        tracing::info!(
            host = %app.config.server.host,
            port = app.config.server.port,
            store = app.store.backend_name(),
            shards = app.shards.num_shards(),
            nodes = app.cluster.view().nodes.len(),
            "Server ready"
        );

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }

    pub async fn start_background_tasks(&self) {
        let timer = PersistenceTimer::new(
            Arc::clone(&self.shards),
            Arc::clone(&self.store),
            Duration::from_secs(self.config.storage.flush_period_secs),
        );
        self.shutdown
            .register(timer.spawn(self.shutdown.subscribe()))
            .await;

        let reaper = TtlReaper::new(
            Arc::clone(&self.cluster),
            Arc::clone(&self.store),
            self.config.retention.clone(),
            Duration::from_secs(TTL_SWEEP_PERIOD_SECS),
        );
        self.shutdown
            .register(reaper.spawn(self.shutdown.subscribe()))
            .await;

        let watermark_config = WatermarkConfig {
            limit_percent: self.config.watermark.limit_percent,
            limit_bytes: self.config.watermark.limit_bytes,
            sample_period: Duration::from_secs(self.config.watermark.sample_period_secs),
        };
        if watermark_config.enabled() {
            self.shutdown
                .register(
                    self.watermark
                        .spawn(watermark_config, self.shutdown.subscribe()),
                )
                .await;
        } else {
            tracing::debug!("Memory watermark disabled by config");
        }

        tracing::debug!("Background tasks started");
    }
}
