//! Scheduler for dependency-ordered operation execution.
//!
//! The Scheduler executes the operations requested from a
//! [`PipelineGraph`], together with everything they depend on. An
//! operation starts only after all of its dependencies have settled
//! successfully; independent operations may run in parallel up to
//! `max_parallel`. One Scheduler represents one pipeline run: an
//! operation it has already settled is never executed again.

use crate::core::graph::PipelineGraph;
use crate::core::operation::OperationStatus;
use crate::error::{Error, Result};
use crate::{plog, plog_debug, plog_error, plog_trace, plog_warn};
use chrono::{DateTime, Utc};
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// What to do with the rest of the run once an operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Dispatch nothing new after the first failure.
    #[default]
    FailFast,
    /// Keep running operations that do not depend on the failure.
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub max_parallel: usize,
    pub policy: FailurePolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            policy: FailurePolicy::FailFast,
        }
    }
}

/// Events emitted by the scheduler for operation lifecycle changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerEvent {
    OperationStarted { name: String },
    OperationCompleted { name: String },
    OperationFailed { name: String, error: String },
    OperationSkipped { name: String, reason: String },
    RunFinished,
}

/// Final state of one operation within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationOutcome {
    pub name: String,
    pub status: OperationStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Result of [`Scheduler::run`]. Outcomes are listed in the order the
/// operations settled.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub outcomes: Vec<OperationOutcome>,
    #[serde(skip)]
    errors: Vec<(String, Error)>,
}

impl RunReport {
    pub fn outcome(&self, name: &str) -> Option<&OperationOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn status(&self, name: &str) -> Option<&OperationStatus> {
        self.outcome(name).map(|o| &o.status)
    }

    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|o| o.status.is_success())
    }

    /// Names of operations whose action returned an error, in this run or
    /// an earlier run of the same scheduler.
    pub fn failed(&self) -> Vec<&str> {
        self.errors.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Names of operations that were executed, in completion order.
    pub fn executed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.status,
                    OperationStatus::Completed | OperationStatus::Failed { .. }
                )
            })
            .map(|o| o.name.as_str())
            .collect()
    }

    /// Turn the first failure into an error, keeping the original cause.
    pub fn into_result(mut self) -> Result<Self> {
        if self.errors.is_empty() {
            return Ok(self);
        }
        let (name, source) = self.errors.remove(0);
        Err(Error::OperationFailed {
            name,
            source: Box::new(source),
        })
    }
}

type Completion = (NodeIndex, DateTime<Utc>, Result<()>);

pub struct Scheduler {
    graph: Arc<PipelineGraph>,
    config: SchedulerConfig,
    event_tx: Option<mpsc::Sender<SchedulerEvent>>,
    cancel: CancellationToken,
    run_id: Uuid,
    /// Final status of every operation settled so far in this run.
    settled: HashMap<NodeIndex, OperationStatus>,
}

impl Scheduler {
    pub fn new(graph: Arc<PipelineGraph>, config: SchedulerConfig) -> Self {
        Self {
            graph,
            config: SchedulerConfig {
                max_parallel: config.max_parallel.max(1),
                ..config
            },
            event_tx: None,
            cancel: CancellationToken::new(),
            run_id: Uuid::new_v4(),
            settled: HashMap::new(),
        }
    }

    pub fn with_events(mut self, event_tx: mpsc::Sender<SchedulerEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Use `token` to stop dispatching; running operations still finish.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Whether `name` has already been settled in this run.
    pub fn is_settled(&self, name: &str) -> bool {
        self.graph
            .handle(name)
            .is_some_and(|h| self.settled.contains_key(&h.index()))
    }

    fn emit(&self, event: SchedulerEvent) {
        if let Some(tx) = &self.event_tx {
            if tx.try_send(event).is_err() {
                plog_trace!("Scheduler event dropped (channel full or closed)");
            }
        }
    }

    fn name_of(&self, index: NodeIndex) -> String {
        self.graph
            .operation_at(index)
            .map(|op| op.name.clone())
            .unwrap_or_default()
    }

    /// Execute `targets` and their transitive dependencies.
    ///
    /// Operation failures do not make this return `Err`; they are recorded
    /// in the report (see [`RunReport::into_result`]).
    ///
    /// # Errors
    /// `UnknownOperation` if a target is not registered.
    pub async fn run(&mut self, targets: &[&str]) -> Result<RunReport> {
        let selected = self.graph.closure(targets)?;
        let mut order: Vec<NodeIndex> = selected.into_iter().collect();
        order.sort();
        plog!(
            "Run {}: {} operation(s) for targets {:?}",
            self.run_id,
            order.len(),
            targets
        );

        let mut status: HashMap<NodeIndex, OperationStatus> = HashMap::new();
        let mut outcomes: HashMap<NodeIndex, OperationOutcome> = HashMap::new();
        let mut settle_order: Vec<NodeIndex> = Vec::new();
        let mut errors: Vec<(String, Error)> = Vec::new();

        for &index in &order {
            let outcome = match self.settled.get(&index) {
                Some(previous) => {
                    let carried = if previous.is_success() {
                        OperationStatus::UpToDate
                    } else {
                        previous.clone()
                    };
                    if let OperationStatus::Failed { error } = previous {
                        errors.push((self.name_of(index), Error::PriorFailure(error.clone())));
                    }
                    settle_order.push(index);
                    carried
                }
                None => OperationStatus::Pending,
            };
            status.insert(index, outcome.clone());
            outcomes.insert(
                index,
                OperationOutcome {
                    name: self.name_of(index),
                    status: outcome,
                    started_at: None,
                    finished_at: None,
                },
            );
        }

        let (done_tx, mut done_rx) = mpsc::channel::<Completion>(order.len().max(1));
        let mut running = 0usize;
        let mut halted = false;

        loop {
            let mut progressed = true;
            while progressed {
                progressed = false;
                for &index in &order {
                    if status.get(&index) != Some(&OperationStatus::Pending) {
                        continue;
                    }

                    let deps = self.graph.direct_dependencies(index);
                    let blocker = deps.iter().find(|dep| {
                        status
                            .get(*dep)
                            .is_some_and(|s| s.is_settled() && !s.is_success())
                    });
                    if let Some(&dep) = blocker {
                        let name = self.name_of(index);
                        let reason =
                            format!("dependency '{}' did not succeed", self.name_of(dep));
                        plog_warn!("Skipping '{}': {}", name, reason);
                        self.emit(SchedulerEvent::OperationSkipped {
                            name,
                            reason: reason.clone(),
                        });
                        status.insert(index, OperationStatus::Skipped { reason });
                        settle_order.push(index);
                        progressed = true;
                        continue;
                    }

                    let ready = deps
                        .iter()
                        .all(|dep| status.get(dep).is_some_and(OperationStatus::is_success));
                    if !ready || halted || running >= self.config.max_parallel {
                        continue;
                    }
                    if self.cancel.is_cancelled() {
                        plog_debug!("Run cancelled, not starting '{}'", self.name_of(index));
                        status.insert(index, OperationStatus::Cancelled);
                        settle_order.push(index);
                        progressed = true;
                        continue;
                    }

                    self.dispatch(index, done_tx.clone());
                    if let Some(outcome) = outcomes.get_mut(&index) {
                        outcome.started_at = Some(Utc::now());
                    }
                    status.insert(index, OperationStatus::Running);
                    running += 1;
                    progressed = true;
                }
            }

            if running == 0 {
                break;
            }

            let Some((index, finished_at, result)) = done_rx.recv().await else {
                return Err(Error::TaskJoin(
                    "completion channel closed unexpectedly".to_string(),
                ));
            };
            running -= 1;
            let name = self.name_of(index);
            if let Some(outcome) = outcomes.get_mut(&index) {
                outcome.finished_at = Some(finished_at);
            }

            match result {
                Ok(()) => {
                    plog!("Operation '{}' completed", name);
                    self.emit(SchedulerEvent::OperationCompleted { name });
                    status.insert(index, OperationStatus::Completed);
                }
                Err(e) => {
                    let error = e.to_string();
                    plog_error!("Operation '{}' failed: {}", name, error);
                    self.emit(SchedulerEvent::OperationFailed {
                        name: name.clone(),
                        error: error.clone(),
                    });
                    status.insert(index, OperationStatus::Failed { error });
                    errors.push((name, e));
                    if self.config.policy == FailurePolicy::FailFast {
                        halted = true;
                    }
                }
            }
            settle_order.push(index);
        }

        // Anything still pending was held back by a halt or a cancellation.
        for &index in &order {
            if status.get(&index) == Some(&OperationStatus::Pending) {
                let final_status = if self.cancel.is_cancelled() {
                    OperationStatus::Cancelled
                } else {
                    OperationStatus::Skipped {
                        reason: "run aborted after an earlier failure".to_string(),
                    }
                };
                status.insert(index, final_status);
                settle_order.push(index);
            }
        }

        for (&index, final_status) in &status {
            if let Some(outcome) = outcomes.get_mut(&index) {
                outcome.status = final_status.clone();
            }
            if final_status != &OperationStatus::UpToDate {
                self.settled
                    .entry(index)
                    .or_insert_with(|| final_status.clone());
            }
        }

        self.emit(SchedulerEvent::RunFinished);
        let report = RunReport {
            run_id: self.run_id,
            outcomes: settle_order
                .into_iter()
                .filter_map(|index| outcomes.remove(&index))
                .collect(),
            errors,
        };
        plog!(
            "Run {} finished: {} operation(s), {} failure(s)",
            self.run_id,
            report.outcomes.len(),
            report.errors.len()
        );
        Ok(report)
    }

    fn dispatch(&self, index: NodeIndex, done_tx: mpsc::Sender<Completion>) {
        let Some(op) = self.graph.operation_at(index) else {
            return;
        };
        let name = op.name.clone();
        let action = Arc::clone(&op.action);
        plog!("Starting operation '{}' ({})", name, action.describe());
        self.emit(SchedulerEvent::OperationStarted { name: name.clone() });

        tokio::task::spawn_blocking(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| action.execute()))
                .unwrap_or_else(|_| Err(Error::TaskJoin(format!("operation '{}' panicked", name))));
            let _ = done_tx.blocking_send((index, Utc::now(), result));
        });
    }
}
