use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{plog_debug, Error, Result};

/// How to launch the node binary for one data directory.
///
/// Fields missing from a `[node]` table take their value from [`Default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    pub binary: String,
    /// Argument templates; `{data_dir}` is replaced with the instance directory.
    pub args: Vec<String>,
    /// File (relative to the data dir) whose appearance marks the node ready.
    pub ready_file: Option<String>,
    pub start_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            binary: "bitcoind".to_string(),
            args: default_args(),
            ready_file: default_ready_file(),
            start_timeout_secs: default_timeout_secs(),
            stop_timeout_secs: default_timeout_secs(),
        }
    }
}

impl NodeConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }

    /// Expand the argument templates for one data directory.
    pub fn args_for(&self, data_dir: &Path) -> Vec<String> {
        let dir = data_dir.display().to_string();
        self.args
            .iter()
            .map(|arg| arg.replace("{data_dir}", &dir))
            .collect()
    }
}

fn default_args() -> Vec<String> {
    [
        "-regtest",
        "-datadir={data_dir}",
        "-server",
        "-listen=0",
        "-rpcbind=127.0.0.1",
        "-rpcallowip=127.0.0.1",
        "-fallbackfee=0.00000001",
        "-txindex=1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_ready_file() -> Option<String> {
    Some("regtest/.cookie".to_string())
}

fn default_timeout_secs() -> u64 {
    30
}

/// One configured (data dir, suffix) pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InstanceConfig {
    pub data_dir: PathBuf,
    #[serde(default)]
    pub suffix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Inserted between the verb and the suffix of every operation name.
    #[serde(default)]
    pub label: String,
    pub max_parallel: Option<usize>,
    #[serde(default)]
    pub continue_on_failure: bool,
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub instances: Vec<InstanceConfig>,
}

impl Config {
    pub fn app_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir()
            .ok_or(Error::NoHomeDir)?
            .join(".regtest-pipeline"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("config.toml"))
    }

    pub fn default_data_dir() -> Result<PathBuf> {
        Ok(Self::app_dir()?.join("regtest"))
    }

    pub fn effective_max_parallel(&self) -> usize {
        self.max_parallel.unwrap_or(1).max(1)
    }

    /// Configured instances, or the single default instance when none are set.
    pub fn effective_instances(&self) -> Result<Vec<InstanceConfig>> {
        if !self.instances.is_empty() {
            return Ok(self.instances.clone());
        }
        Ok(vec![InstanceConfig {
            data_dir: Self::default_data_dir()?,
            suffix: String::new(),
        }])
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        plog_debug!("Config::load path={}", path.display());
        if !path.exists() {
            plog_debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        plog_debug!(
            "Config loaded: label={:?}, instances={}, binary={}",
            config.label,
            config.instances.len(),
            config.node.binary
        );
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        plog_debug!("Config saved to {}", path.display());
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }
}
