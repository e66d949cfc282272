//! Configuration for the routewatch-discover scanner.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use routewatch_core::SeverityThresholds;
use routewatch_store::GraphConfig;

use crate::credentials::Credentials;
use crate::error::{DiscoverError, Result};
use crate::routeros;

/// Top-level discover configuration.
///
/// Loaded from the `[discover]` section of `routewatch.toml` or
/// `ROUTEWATCH_DISCOVER__DISCOVER__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverConfig {
    /// RouterOS API port on scanned devices.
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Upper bound for everything a scan does against one device: login,
    /// system info and neighbor table share this one deadline.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,

    /// TCP connect timeout for the direct transport.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Maximum scan jobs the scheduler runs at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_scans: usize,

    #[serde(default)]
    pub credentials: Credentials,

    #[serde(default)]
    pub tunnel: TunnelConfig,

    #[serde(default)]
    pub severity: SeverityThresholds,

    #[serde(default)]
    pub store: StoreConfig,

    /// Per-subnet scheduling configuration.
    #[serde(default)]
    pub subnets: Vec<SubnetSchedule>,
}

impl DiscoverConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// SSH jump host used to reach the routers.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TunnelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub user: String,
    /// Private key handed to the tunnel as its secret.
    #[serde(default)]
    pub identity_file: String,
    #[serde(default = "default_ssh_port")]
    pub ssh_port: u16,
    #[serde(default = "default_ssh_path")]
    pub ssh_path: String,
    /// Where the control-master socket lives.
    #[serde(default = "std::env::temp_dir")]
    pub control_dir: PathBuf,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: String::new(),
            user: String::new(),
            identity_file: String::new(),
            ssh_port: default_ssh_port(),
            ssh_path: default_ssh_path(),
            control_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local; results vanish on exit.
    #[default]
    Memory,
    Neo4j,
}

/// A subnet with its scan schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct SubnetSchedule {
    /// CIDR target (e.g., "10.0.1.0/24").
    pub cidr: String,

    /// Human-readable name for this subnet.
    pub name: Option<String>,

    /// Scan interval in seconds.
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Whether this subnet is enabled for scanning.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_api_port() -> u16 {
    routeros::DEFAULT_PORT
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    3
}

fn default_max_concurrent() -> usize {
    4
}

fn default_ssh_port() -> u16 {
    22
}

fn default_ssh_path() -> String {
    "ssh".to_string()
}

fn default_interval() -> u64 {
    3600
}

fn default_true() -> bool {
    true
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            probe_timeout_secs: default_probe_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            max_concurrent_scans: default_max_concurrent(),
            credentials: Credentials::default(),
            tunnel: TunnelConfig::default(),
            severity: SeverityThresholds::default(),
            store: StoreConfig::default(),
            subnets: Vec::new(),
        }
    }
}

fn builder(file_prefix: &str, env_prefix: &str) -> std::result::Result<config::Config, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        )
        .build()
}

/// Load the `[discover]` section. A missing section yields the defaults.
pub fn load_discover_config(file_prefix: &str) -> Result<DiscoverConfig> {
    let cfg = builder(file_prefix, "ROUTEWATCH_DISCOVER")
        .map_err(|e| DiscoverError::Config(e.to_string()))?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(DiscoverError::Config(e.to_string())),
    }
}

/// Load the `[neo4j]` section, falling back to local development defaults.
pub fn load_graph_config(file_prefix: &str) -> GraphConfig {
    match builder(file_prefix, "ROUTEWATCH") {
        Ok(c) => GraphConfig {
            uri: c
                .get_string("neo4j.uri")
                .unwrap_or_else(|_| "bolt://localhost:7687".to_string()),
            user: c
                .get_string("neo4j.user")
                .unwrap_or_else(|_| "neo4j".to_string()),
            password: c
                .get_string("neo4j.password")
                .unwrap_or_else(|_| "routewatch-dev".to_string()),
            ..Default::default()
        },
        Err(_) => GraphConfig::default(),
    }
}
