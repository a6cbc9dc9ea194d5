//! Orchestration layer: executes registered operations in dependency order.

mod scheduler;

pub use scheduler::{
    FailurePolicy, OperationOutcome, RunReport, Scheduler, SchedulerConfig, SchedulerEvent,
};
