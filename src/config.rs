//! Configuration for lp-genealogy

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::TraceError;
use crate::trace::{
    validate_max_depth, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NODES, DEFAULT_RECALL_MAX_DEPTH,
};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lp-genealogy")
}

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding genealogy.db
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// HTTP API port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Depth for forward/backward traces when the request gives none
    #[serde(default = "default_max_depth")]
    pub default_max_depth: u32,

    /// Depth for recall simulations when the request gives none
    #[serde(default = "default_recall_max_depth")]
    pub recall_max_depth: u32,

    /// Visited-node ceiling per call
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,

    /// Per-request deadline in milliseconds (0 = none)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_http_port() -> u16 {
    8095
}

fn default_max_depth() -> u32 {
    DEFAULT_MAX_DEPTH
}

fn default_recall_max_depth() -> u32 {
    DEFAULT_RECALL_MAX_DEPTH
}

fn default_max_nodes() -> usize {
    DEFAULT_MAX_NODES
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            http_port: default_http_port(),
            default_max_depth: DEFAULT_MAX_DEPTH,
            recall_max_depth: DEFAULT_RECALL_MAX_DEPTH,
            max_nodes: DEFAULT_MAX_NODES,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| TraceError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TraceError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TraceError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject limits the engine would refuse at request time
    pub fn validate(&self) -> Result<(), TraceError> {
        validate_max_depth(self.default_max_depth)
            .map_err(|e| TraceError::Config(format!("default_max_depth: {}", e)))?;
        validate_max_depth(self.recall_max_depth)
            .map_err(|e| TraceError::Config(format!("recall_max_depth: {}", e)))?;
        if self.max_nodes == 0 {
            return Err(TraceError::Config("max_nodes must be at least 1".into()));
        }
        Ok(())
    }

    /// Get config file path
    pub fn config_path(&self) -> PathBuf {
        self.storage_dir.join("config.toml")
    }

    pub fn trace_defaults(&self) -> TraceDefaults {
        TraceDefaults {
            default_max_depth: self.default_max_depth,
            recall_max_depth: self.recall_max_depth,
            max_nodes: self.max_nodes,
            request_timeout: match self.request_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }
}

/// Limits the service applies when a request leaves them open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceDefaults {
    pub default_max_depth: u32,
    pub recall_max_depth: u32,
    pub max_nodes: usize,
    pub request_timeout: Option<Duration>,
}

impl Default for TraceDefaults {
    fn default() -> Self {
        Config::default().trace_defaults()
    }
}
