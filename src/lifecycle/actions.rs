//! Command objects behind the start, stop and clean operations.
//!
//! Each one captures its instance's data directory at registration time
//! and does nothing until the scheduler calls [`Action::execute`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::operation::Action;
use crate::process::NodeProcess;
use crate::{plog, plog_debug, Error, Result};

/// Starts the node unless one is already running for the data dir.
pub struct StartNode {
    node: Arc<dyn NodeProcess>,
    data_dir: PathBuf,
}

impl StartNode {
    pub fn new(node: Arc<dyn NodeProcess>, data_dir: &Path) -> Self {
        Self {
            node,
            data_dir: data_dir.to_path_buf(),
        }
    }
}

impl Action for StartNode {
    fn execute(&self) -> Result<()> {
        if let Some(handle) = self.node.running(&self.data_dir) {
            plog!(
                "Node already running for {} (pid={}), nothing to start",
                self.data_dir.display(),
                handle.pid
            );
            return Ok(());
        }
        self.node.start(&self.data_dir)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("start node in {}", self.data_dir.display())
    }
}

/// Stops the node if one is running for the data dir.
pub struct StopNode {
    node: Arc<dyn NodeProcess>,
    data_dir: PathBuf,
}

impl StopNode {
    pub fn new(node: Arc<dyn NodeProcess>, data_dir: &Path) -> Self {
        Self {
            node,
            data_dir: data_dir.to_path_buf(),
        }
    }
}

impl Action for StopNode {
    fn execute(&self) -> Result<()> {
        match self.node.running(&self.data_dir) {
            Some(handle) => self.node.stop(&handle),
            None => {
                plog!(
                    "No node running for {}, nothing to stop",
                    self.data_dir.display()
                );
                Ok(())
            }
        }
    }

    fn describe(&self) -> String {
        format!("stop node in {}", self.data_dir.display())
    }
}

/// Recursively deletes the data dir. An absent directory is success.
pub struct CleanDataDir {
    data_dir: PathBuf,
}

impl CleanDataDir {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
        }
    }
}

impl Action for CleanDataDir {
    fn execute(&self) -> Result<()> {
        if self.data_dir.parent().is_none() {
            return Err(Error::Validation(format!(
                "Refusing to delete {}",
                self.data_dir.display()
            )));
        }

        let metadata = match fs::symlink_metadata(&self.data_dir) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                plog_debug!("{} already absent", self.data_dir.display());
                return Ok(());
            }
            Err(source) => {
                return Err(Error::Cleanup {
                    path: self.data_dir.clone(),
                    source,
                })
            }
        };

        // Symlinks are unlinked, never followed.
        let removed = if metadata.is_dir() {
            fs::remove_dir_all(&self.data_dir)
        } else {
            fs::remove_file(&self.data_dir)
        };

        match removed {
            Ok(()) => {
                plog!("Removed {}", self.data_dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(Error::Cleanup {
                path: self.data_dir.clone(),
                source,
            }),
        }
    }

    fn describe(&self) -> String {
        format!("delete {}", self.data_dir.display())
    }
}
