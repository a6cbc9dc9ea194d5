//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - Temporary data directories with node-like content
//! - A registrar backed by `MockNode`
//! - A timeline that records when each operation begins and ends

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;

use regtest_pipeline::core::{Action, PipelineGraph};
use regtest_pipeline::orchestration::{FailurePolicy, Scheduler, SchedulerConfig};
use regtest_pipeline::{LifecycleOps, LifecycleRegistrar, MockNode, NodeHandle, NodeProcess, Result};

/// A scratch area plus a mock-backed registrar and an empty graph.
pub struct Harness {
    pub temp_dir: TempDir,
    pub node: Arc<MockNode>,
    pub registrar: LifecycleRegistrar,
    pub graph: PipelineGraph,
}

impl Harness {
    pub fn new() -> Self {
        let node = Arc::new(MockNode::new());
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
            registrar: LifecycleRegistrar::new(node.clone()),
            node,
            graph: PipelineGraph::new(),
        }
    }

    /// Path for a node data dir inside the scratch area (not created).
    pub fn data_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub fn register(&mut self, dir_name: &str, suffix: &str) -> LifecycleOps {
        let dir = self.data_dir(dir_name);
        self.registrar
            .register_all(&mut self.graph, dir, suffix)
            .expect("Failed to register instance")
    }

    /// Move the graph into a scheduler.
    pub fn scheduler(&mut self, max_parallel: usize, policy: FailurePolicy) -> Scheduler {
        let graph = std::mem::take(&mut self.graph);
        Scheduler::new(
            Arc::new(graph),
            SchedulerConfig {
                max_parallel,
                policy,
            },
        )
    }
}

/// Fill a directory with the kind of files a regtest node leaves behind.
pub fn populate_data_dir(dir: &Path) {
    fs::create_dir_all(dir.join("regtest/blocks")).expect("Failed to create blocks dir");
    fs::create_dir_all(dir.join("regtest/wallets/default")).expect("Failed to create wallet dir");
    fs::write(dir.join("regtest/blocks/blk00000.dat"), vec![0u8; 1024])
        .expect("Failed to write block file");
    fs::write(dir.join("regtest/.cookie"), "__cookie__:secret").expect("Failed to write cookie");
    fs::write(dir.join("bitcoin.conf"), "regtest=1\n").expect("Failed to write conf");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Begin,
    End,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub phase: Phase,
    pub at: Instant,
}

#[derive(Clone, Default)]
pub struct Timeline {
    entries: Arc<Mutex<Vec<Entry>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str, phase: Phase) {
        self.entries.lock().unwrap().push(Entry {
            name: name.to_string(),
            phase,
            at: Instant::now(),
        });
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn at(&self, name: &str, phase: Phase) -> Option<Instant> {
        self.entries()
            .into_iter()
            .find(|e| e.name == name && e.phase == phase)
            .map(|e| e.at)
    }

    /// Names in the order they began executing.
    pub fn begun(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.phase == Phase::Begin)
            .map(|e| e.name)
            .collect()
    }
}

struct Recorded {
    name: String,
    inner: Arc<dyn Action>,
    timeline: Timeline,
}

impl Action for Recorded {
    fn execute(&self) -> Result<()> {
        self.timeline.push(&self.name, Phase::Begin);
        let result = self.inner.execute();
        self.timeline.push(&self.name, Phase::End);
        result
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

/// Copy `graph` with every action wrapped so it records into `timeline`.
///
/// Names and dependency edges are preserved exactly.
pub fn recorded_copy(graph: &PipelineGraph, timeline: &Timeline) -> PipelineGraph {
    let mut copy = PipelineGraph::new();
    for name in graph.names() {
        let op = graph.get(name).expect("name listed by graph");
        let deps = graph.dependencies_of(name);
        copy.register(
            name,
            &deps,
            Arc::new(Recorded {
                name: name.to_string(),
                inner: Arc::clone(&op.action),
                timeline: timeline.clone(),
            }),
        )
        .expect("Failed to copy operation");
    }
    copy
}

/// Node whose stop takes a while, to widen any ordering race.
pub struct SlowStopNode {
    pub inner: MockNode,
    pub delay: Duration,
}

impl SlowStopNode {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: MockNode::new(),
            delay,
        }
    }
}

impl NodeProcess for SlowStopNode {
    fn start(&self, data_dir: &Path) -> Result<NodeHandle> {
        self.inner.start(data_dir)
    }

    fn lookup(&self, data_dir: &Path) -> Option<NodeHandle> {
        self.inner.lookup(data_dir)
    }

    fn is_running(&self, handle: &NodeHandle) -> bool {
        self.inner.is_running(handle)
    }

    fn stop(&self, handle: &NodeHandle) -> Result<()> {
        thread::sleep(self.delay);
        self.inner.stop(handle)
    }
}
