// src/config.rs

//! Manages configuration: loading, defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Tree ids 0 and 0xFFFFFFFF are reserved on the wire.
const MAX_TREE_ID: u32 = u32::MAX - 1;

/// Settings for the per-session tree-connect id space.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TreeConnectConfig {
    /// Tree ids are handed out from `1..=max_per_session`.
    #[serde(default = "default_max_per_session")]
    pub max_per_session: u32,
}

impl Default for TreeConnectConfig {
    fn default() -> Self {
        Self {
            max_per_session: default_max_per_session(),
        }
    }
}

fn default_max_per_session() -> u32 {
    1024
}

/// Settings for the channel to the authorization daemon.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IpcConfig {
    /// How long a request waits for the daemon before it counts as unanswered.
    #[serde(with = "humantime_serde", default = "default_ipc_timeout")]
    pub timeout: Duration,
    /// The capacity of the bounded request queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            timeout: default_ipc_timeout(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_ipc_timeout() -> Duration {
    Duration::from_secs(10)
}
fn default_queue_capacity() -> usize {
    1024
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
}

/// A single `[[shares]]` entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ShareDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub read_only: bool,
    #[serde(default = "default_browseable")]
    pub browseable: bool,
    #[serde(default)]
    pub guest_ok: bool,
    /// A named-pipe share (such as `IPC$`) with no backing directory.
    #[serde(default)]
    pub pipe: bool,
}

fn default_browseable() -> bool {
    true
}

impl ShareDefinition {
    /// A writable, browseable disk share rooted at `path`.
    pub fn disk(name: &str, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            path: Some(path.into()),
            comment: None,
            read_only: false,
            browseable: true,
            guest_ok: false,
            pipe: false,
        }
    }
}

/// A raw representation of the config file before validation.
#[derive(Deserialize)]
struct RawConfig {
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default)]
    tree_connect: TreeConnectConfig,
    #[serde(default)]
    ipc: IpcConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    shares: Vec<ShareDefinition>,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// The validated configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub log_level: String,
    #[serde(default)]
    pub tree_connect: TreeConnectConfig,
    #[serde(default)]
    pub ipc: IpcConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub shares: Vec<ShareDefinition>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            tree_connect: TreeConnectConfig::default(),
            ipc: IpcConfig::default(),
            metrics: MetricsConfig::default(),
            shares: Vec::new(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        let config = Config {
            log_level: raw.log_level,
            tree_connect: raw.tree_connect,
            ipc: raw.ipc,
            metrics: raw.metrics,
            shares: raw.shares,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.tree_connect.max_per_session == 0 {
            return Err(anyhow!("tree_connect.max_per_session cannot be 0"));
        }
        if self.tree_connect.max_per_session > MAX_TREE_ID {
            return Err(anyhow!(
                "tree_connect.max_per_session cannot exceed {MAX_TREE_ID}"
            ));
        }
        if self.ipc.timeout.is_zero() {
            return Err(anyhow!("ipc.timeout cannot be 0"));
        }
        if self.ipc.queue_capacity == 0 {
            return Err(anyhow!("ipc.queue_capacity cannot be 0"));
        }

        let mut seen = HashSet::new();
        for (i, share) in self.shares.iter().enumerate() {
            let name = share.name.trim();
            if name.is_empty() {
                return Err(anyhow!("share #{} has an empty name", i + 1));
            }
            if !seen.insert(name.to_lowercase()) {
                return Err(anyhow!("duplicate share name '{}'", share.name));
            }
            if !share.pipe && share.path.is_none() {
                return Err(anyhow!("share '{}' has no path", share.name));
            }
            if share.pipe && share.path.is_some() {
                warn!("pipe share '{}' ignores its path setting", share.name);
            }
        }

        Ok(())
    }
}
