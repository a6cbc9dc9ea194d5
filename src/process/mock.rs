use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::{NodeHandle, NodeProcess};
use crate::{Error, Result};

/// A call observed by [`MockNode`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Spawned { data_dir: PathBuf, pid: u32 },
    Killed { data_dir: PathBuf, pid: u32 },
}

#[derive(Default)]
struct MockState {
    running: HashMap<PathBuf, NodeHandle>,
    next_pid: u32,
    calls: Vec<MockCall>,
    start_failure: Option<String>,
    stop_failure: Option<String>,
}

/// In-memory node process for tests and dry runs.
///
/// Tracks one "process" per data directory and records every real spawn
/// and kill so callers can assert how many side effects happened.
#[derive(Default)]
pub struct MockNode {
    state: Mutex<MockState>,
}

impl MockNode {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make every subsequent `start` fail with `message`.
    pub fn fail_start_with(&self, message: &str) {
        self.state().start_failure = Some(message.to_string());
    }

    /// Make every subsequent `stop` of a running node fail with `message`.
    pub fn fail_stop_with(&self, message: &str) {
        self.state().stop_failure = Some(message.to_string());
    }

    /// Pretend a node was left running by an earlier, interrupted run.
    pub fn leave_running(&self, data_dir: &Path) -> NodeHandle {
        let mut state = self.state();
        state.next_pid += 1;
        let handle = NodeHandle::new(10_000 + state.next_pid, data_dir);
        state.running.insert(data_dir.to_path_buf(), handle.clone());
        handle
    }

    pub fn is_running_at(&self, data_dir: &Path) -> bool {
        self.state().running.contains_key(data_dir)
    }

    pub fn running_count(&self) -> usize {
        self.state().running.len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state().calls.clone()
    }

    pub fn spawn_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Spawned { .. }))
            .count()
    }

    pub fn kill_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, MockCall::Killed { .. }))
            .count()
    }
}

impl NodeProcess for MockNode {
    fn start(&self, data_dir: &Path) -> Result<NodeHandle> {
        let mut state = self.state();
        if let Some(message) = &state.start_failure {
            return Err(Error::ProcessStart(message.clone()));
        }
        if let Some(handle) = state.running.get(data_dir) {
            return Ok(handle.clone());
        }

        state.next_pid += 1;
        let handle = NodeHandle::new(10_000 + state.next_pid, data_dir);
        state.running.insert(data_dir.to_path_buf(), handle.clone());
        state.calls.push(MockCall::Spawned {
            data_dir: data_dir.to_path_buf(),
            pid: handle.pid,
        });
        Ok(handle)
    }

    fn lookup(&self, data_dir: &Path) -> Option<NodeHandle> {
        self.state().running.get(data_dir).cloned()
    }

    fn is_running(&self, handle: &NodeHandle) -> bool {
        self.state()
            .running
            .get(&handle.data_dir)
            .is_some_and(|h| h.pid == handle.pid)
    }

    fn stop(&self, handle: &NodeHandle) -> Result<()> {
        let mut state = self.state();
        let known = state
            .running
            .get(&handle.data_dir)
            .is_some_and(|h| h.pid == handle.pid);
        if !known {
            return Ok(());
        }
        if let Some(message) = &state.stop_failure {
            return Err(Error::ProcessStop(message.clone()));
        }

        state.running.remove(&handle.data_dir);
        state.calls.push(MockCall::Killed {
            data_dir: handle.data_dir.clone(),
            pid: handle.pid,
        });
        Ok(())
    }
}
