// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display)
pub const APP_NAME: &str = "Spanline";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "spanline";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".spanline";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "spanline.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "SPANLINE_CONFIG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "SPANLINE_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "SPANLINE_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "SPANLINE_LOG";

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "SPANLINE_DEBUG";

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "SPANLINE_DATA_DIR";

// =============================================================================
// Environment Variables - Cluster
// =============================================================================

/// Address this node advertises to peers (host:port)
pub const ENV_ADVERTISE: &str = "SPANLINE_ADVERTISE";

/// Comma-separated peer addresses (host:port,host:port)
pub const ENV_PEERS: &str = "SPANLINE_PEERS";

/// Number of local aggregation shards
pub const ENV_SHARDS: &str = "SPANLINE_SHARDS";

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Metric store backend (memory or sqlite)
pub const ENV_STORE_BACKEND: &str = "SPANLINE_STORE_BACKEND";

/// Flush period in seconds
pub const ENV_FLUSH_PERIOD_SECS: &str = "SPANLINE_FLUSH_PERIOD_SECS";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 11800;

/// Body limit for segment batch ingest (bytes)
pub const SEGMENT_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Body limit for everything else (bytes)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Retry-After value returned with backpressure responses
pub const BACKPRESSURE_RETRY_AFTER_SECS: u64 = 1;

/// Maximum time to wait for background tasks during shutdown
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 300;

// =============================================================================
// Aggregation
// =============================================================================

/// Default number of local shard workers
pub const DEFAULT_SHARD_COUNT: usize = 4;

/// Per-shard command channel capacity
pub const SHARD_CHANNEL_CAPACITY: usize = 10_000;

/// Dispatch channel capacity between intake and the analysis task
pub const DISPATCH_CHANNEL_CAPACITY: usize = 1_024;

/// Default seconds between flush cycles
pub const DEFAULT_FLUSH_PERIOD_SECS: u64 = 3;

/// Attempts per record write within one flush cycle
pub const FLUSH_WRITE_MAX_ATTEMPTS: u32 = 3;

/// Base delay in milliseconds for flush write backoff
pub const FLUSH_WRITE_BASE_DELAY_MS: u64 = 50;

// =============================================================================
// Identifier Resolution Retry
// =============================================================================

/// Maximum buffered unresolved segments
pub const RETRY_BUFFER_CAPACITY: usize = 10_000;

/// Resolution attempts per buffered segment
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Maximum age of a buffered segment in seconds
pub const RETRY_MAX_AGE_SECS: u64 = 60;

/// Seconds between re-resolution passes
pub const RETRY_RESOLVE_PERIOD_SECS: u64 = 5;

// =============================================================================
// Cluster
// =============================================================================

/// Timeout for a single forward request
pub const FORWARD_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Watermark
// =============================================================================

/// Default RSS limit as a percentage of total memory (0 disables)
pub const DEFAULT_WATERMARK_PERCENT: u8 = 75;

/// Seconds between RSS samples
pub const WATERMARK_SAMPLE_PERIOD_SECS: u64 = 2;

// =============================================================================
// Retention
// =============================================================================

/// Default retention for minute-granularity records
pub const DEFAULT_RETENTION_MINUTE_MINUTES: u32 = 90;

/// Default retention for hour-granularity records
pub const DEFAULT_RETENTION_HOUR_HOURS: u32 = 36;

/// Default retention for day-granularity records
pub const DEFAULT_RETENTION_DAY_DAYS: u32 = 45;

/// Default retention for month-granularity records
pub const DEFAULT_RETENTION_MONTH_MONTHS: u32 = 18;

/// Seconds between retention sweeps
pub const TTL_SWEEP_PERIOD_SECS: u64 = 300;

// =============================================================================
// SQLite
// =============================================================================

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "spanline.db";

/// Maximum SQLite connections in the pool
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite cache size pragma (negative = KiB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// SQLite WAL autocheckpoint pragma (pages)
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";
