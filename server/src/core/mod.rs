//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;

pub use crate::app::CoreApp;
pub use cli::{CliConfig, Commands};
pub use config::{AppConfig, ClusterConfig, MetricStoreBackend, RetentionConfig, ServerConfig};
pub use shutdown::ShutdownService;

// Re-export the storage service enum from the data layer
pub use crate::data::StorageService;
