//! Operation model for the pipeline graph.
//!
//! An operation is a named, deferred unit of work. Registering one only
//! records what to do; the scheduler decides when (and whether) the
//! attached [`Action`] runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;

/// Work attached to an operation, invoked by the scheduler once its
/// dependencies have settled.
///
/// Implementations may block; the scheduler runs them on blocking workers.
pub trait Action: Send + Sync {
    fn execute(&self) -> Result<()>;

    /// Short human-readable summary used by `list` and `plan`.
    fn describe(&self) -> String;
}

/// Adapts a closure into an [`Action`].
pub struct FnAction<F> {
    description: String,
    f: F,
}

impl<F> FnAction<F>
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    pub fn new(description: impl Into<String>, f: F) -> Self {
        Self {
            description: description.into(),
            f,
        }
    }

    /// Wrap the closure and erase its type for registration.
    pub fn shared(description: impl Into<String>, f: F) -> Arc<dyn Action> {
        Arc::new(Self::new(description, f))
    }
}

impl<F> Action for FnAction<F>
where
    F: Fn() -> Result<()> + Send + Sync,
{
    fn execute(&self) -> Result<()> {
        (self.f)()
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// A registered operation. Immutable once inserted into the graph.
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub action: Arc<dyn Action>,
    pub registered_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(name: &str, action: Arc<dyn Action>) -> Self {
        Self {
            name: name.to_string(),
            action,
            registered_at: Utc::now(),
        }
    }

    pub fn describe(&self) -> String {
        self.action.describe()
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("action", &self.action.describe())
            .finish()
    }
}

/// Outcome of an operation within one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum OperationStatus {
    /// Not yet dispatched.
    Pending,
    /// Currently executing on a worker.
    Running,
    /// Action returned success.
    Completed,
    /// Action returned an error.
    Failed {
        error: String,
    },
    /// Never executed because a dependency did not succeed.
    Skipped {
        reason: String,
    },
    /// Already settled earlier in this run; not executed again.
    UpToDate,
    /// Never executed because the run was cancelled.
    Cancelled,
}

impl Default for OperationStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl OperationStatus {
    /// Whether the operation has reached a final state for this run.
    pub fn is_settled(&self) -> bool {
        !matches!(self, OperationStatus::Pending | OperationStatus::Running)
    }

    /// Whether dependents may run after this status.
    pub fn is_success(&self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::UpToDate)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationStatus::Pending => write!(f, "pending"),
            OperationStatus::Running => write!(f, "running"),
            OperationStatus::Completed => write!(f, "completed"),
            OperationStatus::Failed { error } => write!(f, "failed: {}", error),
            OperationStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
            OperationStatus::UpToDate => write!(f, "up-to-date"),
            OperationStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
