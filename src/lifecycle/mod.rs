//! Node lifecycle: instances, their start/stop/clean actions, and the
//! registrar that wires them into a pipeline graph.

pub mod actions;
pub mod instance;
pub mod registrar;

pub use actions::{CleanDataDir, StartNode, StopNode};
pub use instance::{Instance, Verb};
pub use registrar::{LifecycleOps, LifecycleRegistrar};
