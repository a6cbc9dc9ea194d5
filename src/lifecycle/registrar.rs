//! Lifecycle registrar.
//!
//! Turns one (data dir, suffix) pair into three operations on a
//! [`PipelineGraph`]: start, stop and clean, with clean depending on stop.
//! Registration only builds the graph; nothing runs until the scheduler
//! executes the operations.

use std::path::Path;
use std::sync::Arc;

use crate::core::graph::{OperationHandle, PipelineGraph};
use crate::lifecycle::actions::{CleanDataDir, StartNode, StopNode};
use crate::lifecycle::instance::{Instance, Verb};
use crate::process::NodeProcess;
use crate::{plog, Error, Result};

/// The operations registered for one instance.
#[derive(Debug, Clone)]
pub struct LifecycleOps {
    pub instance: Instance,
    pub start: OperationHandle,
    pub stop: OperationHandle,
    pub clean: OperationHandle,
}

impl LifecycleOps {
    pub fn handle(&self, verb: Verb) -> OperationHandle {
        match verb {
            Verb::Start => self.start,
            Verb::Stop => self.stop,
            Verb::Clean => self.clean,
        }
    }

    pub fn name(&self, verb: Verb) -> String {
        self.instance.operation_name(verb)
    }
}

pub struct LifecycleRegistrar {
    node: Arc<dyn NodeProcess>,
    label: String,
}

impl LifecycleRegistrar {
    pub fn new(node: Arc<dyn NodeProcess>) -> Self {
        Self {
            node,
            label: String::new(),
        }
    }

    /// Label inserted into every operation name this registrar creates.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Register start, stop and clean for `data_dir` under `suffix`.
    ///
    /// # Errors
    /// - `Validation` if `data_dir` is empty
    /// - `DuplicateInstance` if any of the three names is already taken;
    ///   in that case nothing is inserted
    pub fn register_all(
        &self,
        graph: &mut PipelineGraph,
        data_dir: impl AsRef<Path>,
        suffix: &str,
    ) -> Result<LifecycleOps> {
        let instance = Instance::new(data_dir, suffix)?;
        self.register_instance(graph, instance)
    }

    pub fn register_instance(
        &self,
        graph: &mut PipelineGraph,
        instance: Instance,
    ) -> Result<LifecycleOps> {
        let instance = instance.with_label(&self.label);
        let [start_name, stop_name, clean_name] = instance.operation_names();

        if let Some(taken) = [&start_name, &stop_name, &clean_name]
            .into_iter()
            .find(|name| graph.contains(name))
        {
            return Err(Error::DuplicateInstance {
                name: taken.clone(),
            });
        }

        let dir = instance.data_dir();
        let start = graph
            .register(
                &start_name,
                &[],
                Arc::new(StartNode::new(Arc::clone(&self.node), dir)),
            )
            .map_err(into_duplicate_instance)?;
        let stop = graph
            .register(
                &stop_name,
                &[],
                Arc::new(StopNode::new(Arc::clone(&self.node), dir)),
            )
            .map_err(into_duplicate_instance)?;
        let clean = graph
            .register(
                &clean_name,
                &[stop_name.as_str()],
                Arc::new(CleanDataDir::new(dir)),
            )
            .map_err(into_duplicate_instance)?;

        plog!(
            "Registered lifecycle for {}: {}, {}, {}",
            instance,
            start_name,
            stop_name,
            clean_name
        );
        Ok(LifecycleOps {
            instance,
            start,
            stop,
            clean,
        })
    }

    /// Register several instances, stopping at the first error.
    pub fn register_instances(
        &self,
        graph: &mut PipelineGraph,
        instances: impl IntoIterator<Item = Instance>,
    ) -> Result<Vec<LifecycleOps>> {
        instances
            .into_iter()
            .map(|instance| self.register_instance(graph, instance))
            .collect()
    }
}

fn into_duplicate_instance(err: Error) -> Error {
    match err {
        Error::DuplicateOperation { name } => Error::DuplicateInstance { name },
        other => other,
    }
}
