//! Configuration for chunkvault components
//!
//! Values come from an optional TOML file (path in `CHUNKVAULT_CONFIG`) layered
//! with `CHUNKVAULT__SECTION__FIELD` environment variables. Binaries apply
//! explicit CLI flags on top.

use crate::common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "CHUNKVAULT_CONFIG";

/// Default chunk size (64 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub node: NodeConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            coordinator: CoordinatorConfig::default(),
            catalog: CatalogConfig::default(),
            node: NodeConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the file named by `CHUNKVAULT_CONFIG` (if any)
    /// and the environment.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration from an explicit file path and the environment.
    pub fn load_from(path: Option<&std::path::Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("CHUNKVAULT")
                .prefix_separator("__")
                .separator("__"),
        );

        let config: Config = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string (no environment layering).
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.node.validate()
    }
}

/// Where the coordinator finds its catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CatalogLocation {
    /// Embedded RocksDB catalog
    Local { db_path: PathBuf },
    /// Standalone catalog service
    Remote { url: String },
}

impl Default for CatalogLocation {
    fn default() -> Self {
        CatalogLocation::Local {
            db_path: PathBuf::from("./coord-data/catalog"),
        }
    }
}

/// Placement policy selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementKind {
    #[default]
    RoundRobin,
    LeastLoad,
    ConsistentHash,
}

impl std::str::FromStr for PlacementKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "round_robin" | "round-robin" => Ok(PlacementKind::RoundRobin),
            "least_load" | "least-load" => Ok(PlacementKind::LeastLoad),
            "consistent_hash" | "consistent-hash" | "hrw" => Ok(PlacementKind::ConsistentHash),
            other => Err(Error::InvalidConfig(format!(
                "unknown placement policy: {}",
                other
            ))),
        }
    }
}

/// A storage node known at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeEndpoint {
    pub id: String,
    pub url: String,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP API
    #[serde(default = "default_coord_bind")]
    pub bind_addr: SocketAddr,

    #[serde(default)]
    pub catalog: CatalogLocation,

    /// Storage nodes registered at startup
    #[serde(default)]
    pub nodes: Vec<NodeEndpoint>,

    /// Default chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum chunk transfers in flight per workflow
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Timeout for a single chunk transfer
    #[serde(default = "default_node_timeout")]
    pub node_timeout_ms: u64,

    /// Timeout for a single node health probe
    #[serde(default = "default_health_timeout")]
    pub health_timeout_ms: u64,

    #[serde(default)]
    pub placement: PlacementKind,

    /// Node-resident chunks younger than this are never garbage collected
    #[serde(default = "default_gc_grace")]
    pub gc_grace_secs: u64,

    /// Seconds between background gc passes, 0 disables
    #[serde(default)]
    pub gc_interval_secs: u64,

    /// Seconds between background health checks, 0 disables
    #[serde(default = "default_health_interval")]
    pub health_interval_secs: u64,

    /// Maximum accepted upload body
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

fn default_coord_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5002))
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
fn default_upload_concurrency() -> usize {
    4
}
fn default_node_timeout() -> u64 {
    30_000
}
fn default_health_timeout() -> u64 {
    2_000
}
fn default_gc_grace() -> u64 {
    3_600
}
fn default_health_interval() -> u64 {
    30
}
fn default_max_upload() -> usize {
    4 * 1024 * 1024 * 1024
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_coord_bind(),
            catalog: CatalogLocation::default(),
            nodes: Vec::new(),
            chunk_size: default_chunk_size(),
            upload_concurrency: default_upload_concurrency(),
            node_timeout_ms: default_node_timeout(),
            health_timeout_ms: default_health_timeout(),
            placement: PlacementKind::default(),
            gc_grace_secs: default_gc_grace(),
            gc_interval_secs: 0,
            health_interval_secs: default_health_interval(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

impl CoordinatorConfig {
    pub fn node_timeout(&self) -> Duration {
        Duration::from_millis(self.node_timeout_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_millis(self.health_timeout_ms)
    }

    pub fn gc_grace(&self) -> Duration {
        Duration::from_secs(self.gc_grace_secs)
    }

    pub fn gc_interval(&self) -> Duration {
        Duration::from_secs(self.gc_interval_secs)
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(self.health_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be > 0".into()));
        }
        if self.upload_concurrency == 0 {
            return Err(Error::InvalidConfig(
                "upload_concurrency must be > 0".into(),
            ));
        }
        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(Error::InvalidConfig("node id cannot be empty".into()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate node id: {}",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

/// Standalone catalog service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_bind")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_catalog_db")]
    pub db_path: PathBuf,

    /// Largest accepted request body. File records carry the full chunk id
    /// list, so this bounds the chunk count of one file.
    #[serde(default = "default_catalog_body")]
    pub max_body_bytes: usize,
}

fn default_catalog_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}
fn default_catalog_db() -> PathBuf {
    PathBuf::from("./catalog-data")
}
fn default_catalog_body() -> usize {
    256 * 1024 * 1024
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_catalog_bind(),
            db_path: default_catalog_db(),
            max_body_bytes: default_catalog_body(),
        }
    }
}

/// Storage node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_node_id")]
    pub id: String,

    #[serde(default = "default_node_bind")]
    pub bind_addr: SocketAddr,

    /// Directory holding one file per chunk
    #[serde(default = "default_node_data")]
    pub data_dir: PathBuf,

    /// Advertised capacity; free space is reported against it
    #[serde(default = "default_capacity")]
    pub capacity_bytes: u64,

    /// Largest accepted chunk body
    #[serde(default = "default_max_chunk")]
    pub max_chunk_bytes: usize,
}

fn default_node_id() -> String {
    "node-1".to_string()
}
fn default_node_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5003))
}
fn default_node_data() -> PathBuf {
    PathBuf::from("./chunks")
}
fn default_capacity() -> u64 {
    100 * 1024 * 1024 * 1024
}
fn default_max_chunk() -> usize {
    256 * 1024 * 1024
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: default_node_id(),
            bind_addr: default_node_bind(),
            data_dir: default_node_data(),
            capacity_bytes: default_capacity(),
            max_chunk_bytes: default_max_chunk(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::InvalidConfig("node id cannot be empty".into()));
        }
        if self.max_chunk_bytes == 0 {
            return Err(Error::InvalidConfig("max_chunk_bytes must be > 0".into()));
        }
        Ok(())
    }
}
