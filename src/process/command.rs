use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use super::{NodeHandle, NodeProcess};
use crate::config::NodeConfig;
use crate::{plog, plog_debug, plog_warn, Error, Result};

const NODE_LOG: &str = "node.log";
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Start time of `pid` in clock ticks since boot, from `/proc/<pid>/stat`.
#[cfg(target_os = "linux")]
fn process_start_time(pid: u32) -> Option<u64> {
    let stat = fs::read_to_string(format!("/proc/{}/stat", pid)).ok()?;
    // The command name may contain spaces or parens; fields resume after the last ')'.
    let (_, fields) = stat.rsplit_once(')')?;
    fields.split_whitespace().nth(19)?.parse().ok()
}

#[cfg(not(target_os = "linux"))]
fn process_start_time(_pid: u32) -> Option<u64> {
    None
}

fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid).ok().filter(|p| *p > 0).map(Pid::from_raw)
}

/// Whether any process currently holds `pid`.
fn pid_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    match kill(pid, None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        // EPERM: the process exists but belongs to another user
        Err(_) => true,
    }
}

/// Whether the process now holding `handle.pid` is the one the handle recorded.
fn owns(handle: &NodeHandle) -> bool {
    match (handle.process_start, process_start_time(handle.pid)) {
        (Some(recorded), Some(current)) => recorded == current,
        // Without /proc there is nothing to compare against
        _ => !cfg!(target_os = "linux"),
    }
}

/// Launches the configured node binary as a detached OS process.
///
/// Children spawned by this instance are kept so they can be reaped.
/// Nodes started by an earlier run are found through their handle file and
/// only trusted while the pid still carries the recorded start time, so a
/// reused pid is never adopted or signalled.
pub struct CommandNode {
    config: NodeConfig,
    children: Mutex<HashMap<u32, Child>>,
}

impl CommandNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            children: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn resolve_binary(&self) -> Result<PathBuf> {
        which::which(&self.config.binary).map_err(|e| {
            Error::ProcessStart(format!("cannot locate '{}': {}", self.config.binary, e))
        })
    }

    fn ready_path(&self, data_dir: &Path) -> Option<PathBuf> {
        self.config
            .ready_file
            .as_deref()
            .filter(|f| !f.is_empty())
            .map(|f| data_dir.join(f))
    }

    /// Drop a ready file left behind by a node that died without cleaning up.
    fn clear_ready_file(&self, data_dir: &Path) -> Result<()> {
        let Some(ready) = self.ready_path(data_dir) else {
            return Ok(());
        };
        match fs::remove_file(&ready) {
            Ok(()) => {
                plog_debug!("Removed leftover {}", ready.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::ProcessStart(format!(
                "cannot remove stale {}: {}",
                ready.display(),
                e
            ))),
        }
    }

    fn wait_ready(&self, child: &mut Child, data_dir: &Path) -> Result<()> {
        let Some(ready) = self.ready_path(data_dir) else {
            return Ok(());
        };
        let timeout = self.config.start_timeout();
        let deadline = Instant::now() + timeout;
        plog_debug!("Waiting up to {:?} for {}", timeout, ready.display());

        loop {
            if ready.exists() {
                return Ok(());
            }
            if let Some(status) = child.try_wait()? {
                return Err(Error::ProcessStart(format!(
                    "node exited with {} before becoming ready (see {})",
                    status,
                    data_dir.join(NODE_LOG).display()
                )));
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(Error::ProcessStart(format!(
                    "node not ready after {:?}: {} never appeared",
                    timeout,
                    ready.display()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Reap a child we spawned. Returns `Some(alive)` for known children.
    fn probe_child(&self, pid: u32) -> Option<bool> {
        let mut children = self.children.lock().unwrap_or_else(|e| e.into_inner());
        let child = children.get_mut(&pid)?;
        match child.try_wait() {
            Ok(None) => Some(true),
            Ok(Some(status)) => {
                plog_debug!("Node pid={} exited with {}", pid, status);
                children.remove(&pid);
                Some(false)
            }
            Err(e) => {
                plog_warn!("try_wait failed for pid={}: {}", pid, e);
                None
            }
        }
    }

    /// Send `signal` to `pid`. Returns `false` if the process is already gone.
    fn signal(pid: u32, signal: Signal) -> Result<bool> {
        let target = to_pid(pid)
            .ok_or_else(|| Error::ProcessStop(format!("invalid pid {}", pid)))?;
        match kill(target, signal) {
            Ok(()) => Ok(true),
            Err(Errno::ESRCH) => Ok(false),
            Err(errno) => Err(Error::ProcessStop(format!(
                "cannot send {:?} to pid {}: {}",
                signal, pid, errno
            ))),
        }
    }

    fn wait_exit(&self, handle: &NodeHandle, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_running(handle) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(POLL_INTERVAL);
        }
        true
    }

    fn forget(&self, pid: u32) {
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&pid);
    }
}

impl NodeProcess for CommandNode {
    fn start(&self, data_dir: &Path) -> Result<NodeHandle> {
        if let Some(handle) = self.running(data_dir) {
            plog_debug!("Node already running for {} (pid={})", data_dir.display(), handle.pid);
            return Ok(handle);
        }

        let binary = self.resolve_binary()?;
        fs::create_dir_all(data_dir).map_err(|e| {
            Error::ProcessStart(format!("cannot create {}: {}", data_dir.display(), e))
        })?;
        self.clear_ready_file(data_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(data_dir.join(NODE_LOG))?;

        let args = self.config.args_for(data_dir);
        plog_debug!("Spawning {} {}", binary.display(), args.join(" "));
        let mut child = Command::new(&binary)
            .args(&args)
            .current_dir(data_dir)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()
            .map_err(|e| Error::ProcessStart(format!("{}: {}", binary.display(), e)))?;

        let pid = child.id();
        let handle = NodeHandle::new(pid, data_dir).with_process_start(process_start_time(pid));
        if let Err(e) = self.wait_ready(&mut child, data_dir) {
            let _ = handle.remove_file();
            return Err(e);
        }
        if let Err(e) = handle.save() {
            plog_warn!("Cannot record node pid={}, terminating it: {}", pid, e);
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
        self.children
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pid, child);

        plog!("Node started for {} (pid={})", data_dir.display(), pid);
        Ok(handle)
    }

    fn lookup(&self, data_dir: &Path) -> Option<NodeHandle> {
        NodeHandle::load(data_dir)
    }

    fn is_running(&self, handle: &NodeHandle) -> bool {
        if let Some(alive) = self.probe_child(handle.pid) {
            return alive;
        }
        if !owns(handle) {
            plog_debug!(
                "pid={} is not the node recorded for {}",
                handle.pid,
                handle.data_dir.display()
            );
            return false;
        }
        pid_alive(handle.pid)
    }

    fn stop(&self, handle: &NodeHandle) -> Result<()> {
        if !self.is_running(handle) {
            plog_debug!("Node pid={} not running, removing stale handle", handle.pid);
            self.forget(handle.pid);
            return handle.remove_file();
        }

        plog_debug!("Sending SIGTERM to pid={}", handle.pid);
        Self::signal(handle.pid, Signal::SIGTERM)?;

        if !self.wait_exit(handle, self.config.stop_timeout()) {
            plog_warn!(
                "Node pid={} ignored SIGTERM for {:?}, sending SIGKILL",
                handle.pid,
                self.config.stop_timeout()
            );
            Self::signal(handle.pid, Signal::SIGKILL)?;
            if !self.wait_exit(handle, KILL_GRACE) {
                return Err(Error::ProcessStop(format!(
                    "pid {} still running after SIGKILL",
                    handle.pid
                )));
            }
        }

        self.forget(handle.pid);
        handle.remove_file()?;
        plog!("Node stopped for {} (pid={})", handle.data_dir.display(), handle.pid);
        Ok(())
    }
}
