//! Node process collaborators.
//!
//! The lifecycle operations never touch the OS directly; they go through a
//! [`NodeProcess`]. [`CommandNode`] launches a real binary, [`MockNode`]
//! keeps everything in memory.

mod command;
mod mock;

pub use command::CommandNode;
pub use mock::{MockCall, MockNode};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{plog_debug, plog_warn, Result};

/// File inside the data dir that records the running node.
pub const HANDLE_FILE: &str = "node.pid.json";

/// Reference to one node process bound to a data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHandle {
    pub pid: u32,
    pub data_dir: PathBuf,
    pub started_at: DateTime<Utc>,
    /// Kernel start time of the process, in clock ticks since boot.
    ///
    /// A live pid whose start time differs is some other process that
    /// reused the pid, not this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_start: Option<u64>,
}

impl NodeHandle {
    pub fn new(pid: u32, data_dir: &Path) -> Self {
        Self {
            pid,
            data_dir: data_dir.to_path_buf(),
            started_at: Utc::now(),
            process_start: None,
        }
    }

    pub fn with_process_start(mut self, ticks: Option<u64>) -> Self {
        self.process_start = ticks;
        self
    }

    pub fn file_path(data_dir: &Path) -> PathBuf {
        data_dir.join(HANDLE_FILE)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::file_path(&self.data_dir);
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        plog_debug!("Handle written: pid={} path={}", self.pid, path.display());
        Ok(())
    }

    /// Read the handle recorded in `data_dir`, if any.
    ///
    /// An unreadable or corrupt file is treated as "no handle".
    pub fn load(data_dir: &Path) -> Option<Self> {
        let path = Self::file_path(data_dir);
        let content = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(handle) => Some(handle),
            Err(e) => {
                plog_warn!("Ignoring corrupt handle file {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn remove_file(&self) -> Result<()> {
        match fs::remove_file(Self::file_path(&self.data_dir)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Starts, discovers and stops the node bound to a data directory.
///
/// `start` and `stop` may block until the process is up or gone.
pub trait NodeProcess: Send + Sync {
    /// Launch a node for `data_dir`.
    ///
    /// Fails with `Error::ProcessStart`.
    fn start(&self, data_dir: &Path) -> Result<NodeHandle>;

    /// Find the handle of a node previously started for `data_dir`.
    fn lookup(&self, data_dir: &Path) -> Option<NodeHandle>;

    fn is_running(&self, handle: &NodeHandle) -> bool;

    /// Request termination and wait for it.
    ///
    /// Fails with `Error::ProcessStop`.
    fn stop(&self, handle: &NodeHandle) -> Result<()>;

    /// Handle of a live node for `data_dir`, ignoring stale records.
    fn running(&self, data_dir: &Path) -> Option<NodeHandle> {
        self.lookup(data_dir).filter(|handle| self.is_running(handle))
    }
}
