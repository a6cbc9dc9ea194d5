//! Pipeline graph: the operation namespace for one pipeline run.
//!
//! Operations are nodes of a petgraph `DiGraph`; an edge `a -> b` means
//! `b` depends on `a` and must not start before `a` has settled. Names
//! are unique within a graph and registration never overwrites.

use crate::core::operation::{Action, Operation};
use crate::error::{Error, Result};
use crate::{plog, plog_debug};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

/// Opaque reference to an operation registered in a [`PipelineGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationHandle(NodeIndex);

impl OperationHandle {
    pub(crate) fn index(&self) -> NodeIndex {
        self.0
    }
}

pub struct PipelineGraph {
    graph: DiGraph<Operation, ()>,
    names: HashMap<String, NodeIndex>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            names: HashMap::new(),
        }
    }

    /// Register a named operation that depends on already-registered ones.
    ///
    /// # Errors
    /// - `Validation` if `name` is empty
    /// - `DuplicateOperation` if `name` is taken (the existing one is kept)
    /// - `UnknownOperation` if a dependency has not been registered
    pub fn register(
        &mut self,
        name: &str,
        depends_on: &[&str],
        action: Arc<dyn Action>,
    ) -> Result<OperationHandle> {
        if name.is_empty() {
            return Err(Error::Validation(
                "Operation name cannot be empty".to_string(),
            ));
        }
        if self.names.contains_key(name) {
            return Err(Error::DuplicateOperation {
                name: name.to_string(),
            });
        }

        // Resolve every dependency before touching the graph so a failed
        // registration leaves no partial node behind.
        let deps = depends_on
            .iter()
            .map(|dep| {
                self.names
                    .get(*dep)
                    .copied()
                    .ok_or_else(|| Error::UnknownOperation(dep.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;

        let index = self.graph.add_node(Operation::new(name, action));
        self.names.insert(name.to_string(), index);
        for dep in deps {
            self.graph.update_edge(dep, index, ());
        }

        plog!("Registered operation '{}' (depends on {:?})", name, depends_on);
        Ok(OperationHandle(index))
    }

    /// Declare that `dependent` must wait for `dependency`.
    ///
    /// Both operations must exist. The edge is rolled back if it would
    /// create a cycle.
    pub fn add_dependency(&mut self, dependency: &str, dependent: &str) -> Result<()> {
        let from = self.index_of(dependency)?;
        let to = self.index_of(dependent)?;
        if from == to {
            return Err(Error::Validation(format!(
                "Operation {} cannot depend on itself",
                dependent
            )));
        }
        if self.graph.find_edge(from, to).is_some() {
            return Ok(());
        }

        let edge = self.graph.add_edge(from, to, ());
        if is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(Error::Validation(format!(
                "Adding dependency from {} to {} would create a cycle",
                dependency, dependent
            )));
        }
        plog_debug!("Dependency added: {} -> {}", dependency, dependent);
        Ok(())
    }

    fn index_of(&self, name: &str) -> Result<NodeIndex> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownOperation(name.to_string()))
    }

    pub fn handle(&self, name: &str) -> Option<OperationHandle> {
        self.names.get(name).copied().map(OperationHandle)
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.names
            .get(name)
            .and_then(|&index| self.graph.node_weight(index))
    }

    pub fn operation(&self, handle: OperationHandle) -> Option<&Operation> {
        self.graph.node_weight(handle.0)
    }

    /// Name of the operation behind a handle.
    pub fn name(&self, handle: OperationHandle) -> Option<&str> {
        self.operation(handle).map(|op| op.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All operation names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.graph
            .node_indices()
            .filter_map(|index| self.graph.node_weight(index))
            .map(|op| op.name.as_str())
            .collect()
    }

    pub fn has_dependency(&self, dependency: &str, dependent: &str) -> bool {
        match (self.names.get(dependency), self.names.get(dependent)) {
            (Some(&from), Some(&to)) => self.graph.find_edge(from, to).is_some(),
            _ => false,
        }
    }

    /// Direct dependencies of `name`, in registration order.
    pub fn dependencies_of(&self, name: &str) -> Vec<&str> {
        self.neighbor_names(name, Direction::Incoming)
    }

    /// Operations that directly depend on `name`, in registration order.
    pub fn dependents_of(&self, name: &str) -> Vec<&str> {
        self.neighbor_names(name, Direction::Outgoing)
    }

    fn neighbor_names(&self, name: &str, direction: Direction) -> Vec<&str> {
        let Some(&index) = self.names.get(name) else {
            return Vec::new();
        };
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(index, direction).collect();
        neighbors.sort();
        neighbors
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n))
            .map(|op| op.name.as_str())
            .collect()
    }

    pub(crate) fn direct_dependencies(&self, index: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(index, Direction::Incoming)
            .collect()
    }

    pub(crate) fn operation_at(&self, index: NodeIndex) -> Option<&Operation> {
        self.graph.node_weight(index)
    }

    /// The requested operations plus everything they transitively depend on.
    pub(crate) fn closure(&self, targets: &[&str]) -> Result<HashSet<NodeIndex>> {
        let mut selected = HashSet::new();
        let mut stack = targets
            .iter()
            .map(|name| self.index_of(name))
            .collect::<Result<Vec<_>>>()?;

        while let Some(index) = stack.pop() {
            if selected.insert(index) {
                stack.extend(self.graph.neighbors_directed(index, Direction::Incoming));
            }
        }
        Ok(selected)
    }

    /// Order in which a sequential run would execute `targets`.
    ///
    /// Dependencies come first; ties are broken by registration order, so
    /// the result is deterministic.
    pub fn execution_order(&self, targets: &[&str]) -> Result<Vec<&str>> {
        let selected = self.closure(targets)?;
        let mut remaining: HashMap<NodeIndex, usize> = selected
            .iter()
            .map(|&index| {
                let deps = self
                    .graph
                    .neighbors_directed(index, Direction::Incoming)
                    .filter(|dep| selected.contains(dep))
                    .count();
                (index, deps)
            })
            .collect();

        let mut ready: BTreeSet<NodeIndex> = remaining
            .iter()
            .filter(|(_, &count)| count == 0)
            .map(|(&index, _)| index)
            .collect();

        let mut order = Vec::with_capacity(selected.len());
        while let Some(index) = ready.pop_first() {
            remaining.remove(&index);
            if let Some(op) = self.graph.node_weight(index) {
                order.push(op.name.as_str());
            }
            for dependent in self.graph.neighbors_directed(index, Direction::Outgoing) {
                if let Some(count) = remaining.get_mut(&dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }

        if !remaining.is_empty() {
            return Err(Error::Validation(
                "Cycle detected while ordering operations".to_string(),
            ));
        }
        Ok(order)
    }
}

impl Default for PipelineGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineGraph")
            .field("operations", &self.len())
            .field("dependencies", &self.dependency_count())
            .finish()
    }
}
