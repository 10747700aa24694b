// src/flow/state.rs

//! Per-run node state and the readiness rule.

use tracing::trace;

use crate::flow::graph::TaskGraph;

/// State of a node during (and after) a run.
///
/// `Succeeded`, `Skipped` and `Failed` are terminal. A node whose dependency
/// failed stays `Pending` for the rest of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Ready,
    Running,
    Succeeded,
    Skipped,
    Failed,
}

impl NodeState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            NodeState::Succeeded | NodeState::Skipped | NodeState::Failed
        )
    }

    /// Whether a dependent may treat this node as done.
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, NodeState::Succeeded | NodeState::Skipped)
    }
}

/// Static information the scheduler needs about a node, copied out of the
/// graph so the scheduler core does not depend on the context type.
#[derive(Debug, Clone)]
pub struct NodeInfo {
    pub name: String,
    pub deps: Vec<usize>,
    pub dependents: Vec<usize>,
    pub skip: bool,
    pub sync_point: bool,
}

impl NodeInfo {
    pub(crate) fn from_graph<C>(graph: &TaskGraph<C>) -> Vec<NodeInfo> {
        graph
            .nodes()
            .enumerate()
            .map(|(index, node)| NodeInfo {
                name: node.name.clone(),
                deps: node.deps.clone(),
                dependents: graph.dependents_of(index).to_vec(),
                skip: node.skip,
                sync_point: node.is_sync_point(),
            })
            .collect()
    }
}

/// Manages state transitions for one run.
pub struct StateManager<'a> {
    nodes: &'a [NodeInfo],
    states: &'a mut [NodeState],
}

impl<'a> StateManager<'a> {
    pub fn new(nodes: &'a [NodeInfo], states: &'a mut [NodeState]) -> Self {
        Self { nodes, states }
    }

    /// All dependencies `Succeeded` or `Skipped`.
    pub fn deps_satisfied(&self, index: usize) -> bool {
        self.nodes[index]
            .deps
            .iter()
            .all(|&dep| self.states[dep].satisfies_dependents())
    }

    /// Nodes with no dependencies. They are ready as soon as the run starts.
    pub fn roots(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, info)| info.deps.is_empty())
            .map(|(index, _)| index)
            .collect()
    }

    /// Mark `Pending` dependents of `index` whose dependencies are now all
    /// satisfied as `Ready` and return them in graph order.
    pub fn promote_dependents(&mut self, index: usize) -> Vec<usize> {
        let mut ready = Vec::new();
        for &dependent in &self.nodes[index].dependents {
            if self.states[dependent] == NodeState::Pending && self.deps_satisfied(dependent) {
                trace!(task = %self.nodes[dependent].name, "dependencies satisfied; marking Ready");
                self.states[dependent] = NodeState::Ready;
                ready.push(dependent);
            }
        }
        ready
    }

    /// Mark root nodes `Ready`.
    pub fn promote_roots(&mut self) -> Vec<usize> {
        let roots = self.roots();
        for &root in &roots {
            self.states[root] = NodeState::Ready;
        }
        roots
    }

    pub fn set(&mut self, index: usize, state: NodeState) {
        self.states[index] = state;
    }

    pub fn get(&self, index: usize) -> NodeState {
        self.states[index]
    }

    /// Nodes still `Pending` that can never run because some ancestor failed.
    pub fn blocked(&self) -> Vec<usize> {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, state)| **state == NodeState::Pending)
            .map(|(index, _)| index)
            .collect()
    }
}
