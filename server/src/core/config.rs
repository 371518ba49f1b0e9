use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cluster::NodeAddr;

use super::cli::CliConfig;
use super::constants::{
    APP_DOT_FOLDER, CONFIG_FILE_NAME, DEFAULT_FLUSH_PERIOD_SECS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_RETENTION_DAY_DAYS, DEFAULT_RETENTION_HOUR_HOURS, DEFAULT_RETENTION_MINUTE_MINUTES,
    DEFAULT_RETENTION_MONTH_MONTHS, DEFAULT_SHARD_COUNT, DEFAULT_WATERMARK_PERCENT,
    WATERMARK_SAMPLE_PERIOD_SECS,
};

// =============================================================================
// Metric Store Backend Enum
// =============================================================================

/// Backend for persisted metric records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricStoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl fmt::Display for MetricStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricStoreBackend::Memory => write!(f, "memory"),
            MetricStoreBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

// =============================================================================
// File Configuration (JSON)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ClusterFileConfig {
    pub advertise: Option<String>,
    pub peers: Option<Vec<String>>,
    pub shards: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    pub backend: Option<MetricStoreBackend>,
    pub data_dir: Option<PathBuf>,
    pub flush_period_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetentionFileConfig {
    pub minute_minutes: Option<u32>,
    pub hour_hours: Option<u32>,
    pub day_days: Option<u32>,
    pub month_months: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatermarkFileConfig {
    pub limit_percent: Option<u8>,
    pub limit_bytes: Option<u64>,
    pub sample_period_secs: Option<u64>,
}

/// File-based configuration (JSON)
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub server: Option<ServerFileConfig>,
    pub cluster: Option<ClusterFileConfig>,
    pub storage: Option<StorageFileConfig>,
    pub retention: Option<RetentionFileConfig>,
    pub watermark: Option<WatermarkFileConfig>,
    pub debug: Option<bool>,
    #[serde(flatten)]
    pub extra: serde_json::Value,
}

impl FileConfig {
    /// Load configuration from a JSON file
    fn load_from_file(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "Loading config file");
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        tracing::trace!(config = ?config, "Parsed config file");
        Ok(config)
    }

    /// Warn about unknown fields in the config
    fn warn_unknown_fields(&self) {
        if let serde_json::Value::Object(map) = &self.extra
            && !map.is_empty()
        {
            let keys_str: String = map
                .keys()
                .map(|k| k.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            tracing::warn!(
                fields = %keys_str,
                "Unknown fields in config file (possible typos)"
            );
        }
    }

    /// Merge another FileConfig into this one (other takes precedence)
    fn merge(&mut self, other: FileConfig) {
        if let Some(server) = other.server {
            let current = self.server.get_or_insert_with(ServerFileConfig::default);
            if server.host.is_some() {
                current.host = server.host;
            }
            if server.port.is_some() {
                current.port = server.port;
            }
        }

        if let Some(cluster) = other.cluster {
            let current = self.cluster.get_or_insert_with(ClusterFileConfig::default);
            if cluster.advertise.is_some() {
                current.advertise = cluster.advertise;
            }
            if cluster.peers.is_some() {
                current.peers = cluster.peers;
            }
            if cluster.shards.is_some() {
                current.shards = cluster.shards;
            }
        }

        if let Some(storage) = other.storage {
            let current = self.storage.get_or_insert_with(StorageFileConfig::default);
            if storage.backend.is_some() {
                current.backend = storage.backend;
            }
            if storage.data_dir.is_some() {
                current.data_dir = storage.data_dir;
            }
            if storage.flush_period_secs.is_some() {
                current.flush_period_secs = storage.flush_period_secs;
            }
        }

        if let Some(retention) = other.retention {
            let current = self
                .retention
                .get_or_insert_with(RetentionFileConfig::default);
            if retention.minute_minutes.is_some() {
                current.minute_minutes = retention.minute_minutes;
            }
            if retention.hour_hours.is_some() {
                current.hour_hours = retention.hour_hours;
            }
            if retention.day_days.is_some() {
                current.day_days = retention.day_days;
            }
            if retention.month_months.is_some() {
                current.month_months = retention.month_months;
            }
        }

        if let Some(watermark) = other.watermark {
            let current = self
                .watermark
                .get_or_insert_with(WatermarkFileConfig::default);
            if watermark.limit_percent.is_some() {
                current.limit_percent = watermark.limit_percent;
            }
            if watermark.limit_bytes.is_some() {
                current.limit_bytes = watermark.limit_bytes;
            }
            if watermark.sample_period_secs.is_some() {
                current.sample_period_secs = watermark.sample_period_secs;
            }
        }

        if other.debug.is_some() {
            self.debug = other.debug;
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Address this node advertises to peers
    pub advertise: NodeAddr,
    /// Full node set, always containing `advertise`
    pub peers: Vec<NodeAddr>,
    pub shards: usize,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: MetricStoreBackend,
    pub data_dir: PathBuf,
    pub flush_period_secs: u64,
}

#[derive(Debug, Clone)]
pub struct RetentionConfig {
    pub minute_minutes: u32,
    pub hour_hours: u32,
    pub day_days: u32,
    pub month_months: u32,
}

#[derive(Debug, Clone)]
pub struct WatermarkSettings {
    pub limit_percent: u8,
    pub limit_bytes: u64,
    pub sample_period_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub cluster: ClusterConfig,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub watermark: WatermarkSettings,
    pub debug: bool,
}

/// Default data directory (~/.spanline/data)
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(APP_DOT_FOLDER).join("data"))
        .unwrap_or_else(|| PathBuf::from(APP_DOT_FOLDER).join("data"))
}

fn get_profile_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(APP_DOT_FOLDER).join(CONFIG_FILE_NAME))
}

fn parse_node(s: &str, what: &str) -> Result<NodeAddr> {
    s.parse::<NodeAddr>()
        .map_err(|e| anyhow::anyhow!("Configuration error: invalid {what}: {e}"))
}

impl AppConfig {
    /// Load configuration from all sources
    ///
    /// Priority (lowest to highest):
    /// 1. Defaults
    /// 2. Profile directory config (~/.spanline/spanline.json)
    /// 3. Local directory config OR CLI-specified config path
    /// 4. CLI arguments (which include env var fallbacks via clap)
    pub fn load(cli: &CliConfig) -> Result<Self> {
        tracing::debug!("Loading application configuration");
        tracing::trace!(cli = ?cli, "CLI config");

        let mut file_config = FileConfig::default();
        let mut found_configs: Vec<String> = Vec::new();

        if let Some(profile_path) = get_profile_config_path()
            && profile_path.exists()
        {
            let profile_config = FileConfig::load_from_file(&profile_path)?;
            profile_config.warn_unknown_fields();
            file_config.merge(profile_config);
            found_configs.push(profile_path.display().to_string());
        }

        let overlay_path = if let Some(ref path) = cli.config {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        } else {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            if local.exists() { Some(local) } else { None }
        };

        if let Some(path) = overlay_path {
            let overlay_config = FileConfig::load_from_file(&path)?;
            overlay_config.warn_unknown_fields();
            file_config.merge(overlay_config);
            found_configs.push(path.display().to_string());
        }

        tracing::debug!(configs = ?found_configs, "Config files loaded");

        let file_server = file_config.server.unwrap_or_default();
        let file_cluster = file_config.cluster.unwrap_or_default();
        let file_storage = file_config.storage.unwrap_or_default();
        let file_retention = file_config.retention.unwrap_or_default();
        let file_watermark = file_config.watermark.unwrap_or_default();

        let host = cli
            .host
            .clone()
            .or(file_server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_server.port).unwrap_or(DEFAULT_PORT);

        let advertise = match cli.advertise.clone().or(file_cluster.advertise) {
            Some(s) => parse_node(&s, "cluster.advertise")?,
            None => NodeAddr {
                host: host.clone(),
                port,
            },
        };

        // Peer list from CLI (comma-separated) or file; the advertise
        // address always participates.
        let peer_strings: Vec<String> = match cli.peers.clone() {
            Some(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            None => file_cluster.peers.unwrap_or_default(),
        };
        let mut peers = Vec::with_capacity(peer_strings.len() + 1);
        for s in &peer_strings {
            peers.push(parse_node(s, "cluster.peers entry")?);
        }
        if !peers.contains(&advertise) {
            peers.push(advertise.clone());
        }

        let shards = cli
            .shards
            .or(file_cluster.shards)
            .unwrap_or(DEFAULT_SHARD_COUNT);

        let storage = StorageConfig {
            backend: cli
                .store_backend
                .or(file_storage.backend)
                .unwrap_or_default(),
            data_dir: cli
                .data_dir
                .clone()
                .or(file_storage.data_dir)
                .unwrap_or_else(default_data_dir),
            flush_period_secs: cli
                .flush_period_secs
                .or(file_storage.flush_period_secs)
                .unwrap_or(DEFAULT_FLUSH_PERIOD_SECS),
        };

        let retention = RetentionConfig {
            minute_minutes: file_retention
                .minute_minutes
                .unwrap_or(DEFAULT_RETENTION_MINUTE_MINUTES),
            hour_hours: file_retention
                .hour_hours
                .unwrap_or(DEFAULT_RETENTION_HOUR_HOURS),
            day_days: file_retention
                .day_days
                .unwrap_or(DEFAULT_RETENTION_DAY_DAYS),
            month_months: file_retention
                .month_months
                .unwrap_or(DEFAULT_RETENTION_MONTH_MONTHS),
        };

        let watermark = WatermarkSettings {
            limit_percent: file_watermark
                .limit_percent
                .unwrap_or(DEFAULT_WATERMARK_PERCENT),
            limit_bytes: file_watermark.limit_bytes.unwrap_or(0),
            sample_period_secs: file_watermark
                .sample_period_secs
                .unwrap_or(WATERMARK_SAMPLE_PERIOD_SECS),
        };

        let config = Self {
            server: ServerConfig { host, port },
            cluster: ClusterConfig {
                advertise,
                peers,
                shards,
            },
            storage,
            retention,
            watermark,
            debug: cli.debug || file_config.debug.unwrap_or(false),
        };

        config.validate()?;
        tracing::trace!(config = ?config, "Resolved configuration");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.host.is_empty() {
            anyhow::bail!("Configuration error: server.host must not be empty");
        }
        if self.server.port == 0 {
            anyhow::bail!("Configuration error: server.port must be greater than 0");
        }
        if self.cluster.shards == 0 {
            anyhow::bail!("Configuration error: cluster.shards must be greater than 0");
        }
        if self.storage.flush_period_secs == 0 {
            anyhow::bail!("Configuration error: storage.flush_period_secs must be greater than 0");
        }
        if self.watermark.limit_percent > 100 {
            anyhow::bail!("Configuration error: watermark.limit_percent must be at most 100");
        }

        if self.retention.minute_minutes < 5 {
            tracing::warn!(
                minute_minutes = self.retention.minute_minutes,
                "retention.minute_minutes is very low, minute records may vanish \
                 before their rollups are queried"
            );
        }
        if self.watermark.limit_percent == 0 && self.watermark.limit_bytes == 0 {
            tracing::warn!("Memory watermark disabled, ingest will never shed load");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_cli() {
        let config = AppConfig::load(&CliConfig::default()).unwrap();
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.cluster.shards, DEFAULT_SHARD_COUNT);
        assert_eq!(config.storage.backend, MetricStoreBackend::Memory);
        // Single-node cluster: the advertise address is its own peer.
        assert_eq!(config.cluster.peers, vec![config.cluster.advertise.clone()]);
    }

    #[test]
    fn test_cli_overrides_and_peer_parsing() {
        let cli = CliConfig {
            host: Some("10.0.0.5".to_string()),
            port: Some(12800),
            peers: Some("10.0.0.5:12800, 10.0.0.6:12800".to_string()),
            shards: Some(8),
            ..Default::default()
        };
        let config = AppConfig::load(&cli).unwrap();
        assert_eq!(config.cluster.advertise.to_string(), "10.0.0.5:12800");
        assert_eq!(config.cluster.peers.len(), 2);
        assert_eq!(config.cluster.shards, 8);
    }

    #[test]
    fn test_invalid_peer_is_rejected() {
        let cli = CliConfig {
            peers: Some("not-an-address".to_string()),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }

    #[test]
    fn test_zero_shards_rejected() {
        let cli = CliConfig {
            shards: Some(0),
            ..Default::default()
        };
        assert!(AppConfig::load(&cli).is_err());
    }
}
