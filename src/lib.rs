pub mod config;
pub mod error;
pub mod log;

pub mod core;
pub mod lifecycle;
pub mod orchestration;
pub mod process;

pub use self::core::{Action, OperationHandle, OperationStatus, PipelineGraph};
pub use error::{Error, Result};
pub use lifecycle::{Instance, LifecycleOps, LifecycleRegistrar, Verb};
pub use orchestration::{FailurePolicy, RunReport, Scheduler, SchedulerConfig, SchedulerEvent};
pub use process::{CommandNode, MockNode, NodeHandle, NodeProcess};
