//! Core pipeline model: operations and the graph that orders them.

pub mod graph;
pub mod operation;

pub use graph::{OperationHandle, PipelineGraph};
pub use operation::{Action, FnAction, Operation, OperationStatus};
