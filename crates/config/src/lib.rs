//! Configuration schema and loader for quorumkv nodes.

use serde::{Deserialize, Serialize};

/// Top-level node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Listen port for the HTTP surface.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Cluster peer addresses (`host:port`), this node's own address
    /// included. The health monitor probes exactly this list.
    #[serde(default)]
    pub peers: Vec<String>,

    /// Number of distinct ring peers each mutation is forwarded to.
    #[serde(default = "default_replication_factor")]
    pub replication_factor: usize,

    /// Seconds between health sweeps.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// Per-request deadline for outbound peer traffic, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            peers: Vec::new(),
            replication_factor: default_replication_factor(),
            probe_interval_secs: default_probe_interval_secs(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// --- Defaults ---

fn default_port() -> u16 {
    8080
}
fn default_replication_factor() -> usize {
    2
}
fn default_probe_interval_secs() -> u64 {
    60
}
fn default_request_timeout_ms() -> u64 {
    2000
}

// --- Loading ---

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl NodeConfig {
    /// Validate that configuration values are consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "probe_interval_secs must be > 0".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_ms must be > 0".into(),
            ));
        }
        if self.peers.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid("peers must not be empty".into()));
        }
        Ok(())
    }
}

/// Load a `NodeConfig` from a YAML file path.
pub fn load_from_file(path: &std::path::Path) -> Result<NodeConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    load_from_str(&contents)
}

/// Load a `NodeConfig` from a YAML string.
pub fn load_from_str(yaml: &str) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = serde_yaml::from_str(yaml)?;
    config.validate()?;
    Ok(config)
}

/// Split a comma-separated peer list, discarding empty entries.
pub fn parse_peer_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(String::from)
        .collect()
}
