// src/flow/graph.rs

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

use crate::flow::errors::BuildError;
use crate::flow::task::TaskFn;

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque reference to a node, returned by the build API.
///
/// A handle is an index into the graph that issued it, tagged with that
/// graph's identity so handles of another flow are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    graph: u64,
    index: usize,
}

impl TaskHandle {
    pub(crate) fn new(graph: u64, index: usize) -> Self {
        Self { graph, index }
    }

    /// Insertion-order position of the node in its graph.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// What a node does when it becomes ready.
pub(crate) enum NodeKind<C> {
    Task {
        body: TaskFn<C>,
        retry_interval: Duration,
    },
    SyncPoint,
}

/// Internal node structure.
pub(crate) struct Node<C> {
    pub name: String,
    pub kind: NodeKind<C>,
    /// Fixed at registration time for conditional tasks; never re-evaluated.
    pub skip: bool,
    /// Indices of direct dependencies, all strictly smaller than this node's index.
    pub deps: Vec<usize>,
}

impl<C> Node<C> {
    pub fn is_sync_point(&self) -> bool {
        matches!(self.kind, NodeKind::SyncPoint)
    }

    pub fn retry_interval(&self) -> Duration {
        match self.kind {
            NodeKind::Task { retry_interval, .. } => retry_interval,
            NodeKind::SyncPoint => Duration::ZERO,
        }
    }
}

/// Arena of nodes addressed by insertion index, plus reverse adjacency.
///
/// Dependencies may only reference nodes that already exist, so the graph is
/// acyclic by construction and no cycle check is needed.
pub(crate) struct TaskGraph<C> {
    id: u64,
    nodes: Vec<Node<C>>,
    dependents: Vec<Vec<usize>>,
}

impl<C> TaskGraph<C> {
    pub fn new() -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Node<C> {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node<C>> {
        self.nodes.iter()
    }

    /// Immediate dependents of a node (nodes listing it as a dependency).
    pub fn dependents_of(&self, index: usize) -> &[usize] {
        self.dependents
            .get(index)
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    /// Handle of the node at `index`.
    pub fn handle(&self, index: usize) -> TaskHandle {
        TaskHandle::new(self.id, index)
    }

    /// Whether `handle` was issued by this graph.
    pub fn owns(&self, handle: TaskHandle) -> bool {
        handle.graph == self.id && handle.index < self.nodes.len()
    }

    /// Resolve dependency handles to indices, rejecting foreign or
    /// not-yet-issued handles.
    fn resolve_deps(&self, flow: &str, deps: &[TaskHandle]) -> Result<Vec<usize>, BuildError> {
        let mut resolved: Vec<usize> = Vec::with_capacity(deps.len());
        for &handle in deps {
            if handle.graph != self.id {
                return Err(BuildError::ForeignHandle {
                    flow: flow.to_string(),
                    handle,
                });
            }
            if handle.index >= self.nodes.len() {
                return Err(BuildError::UnknownHandle {
                    flow: flow.to_string(),
                    handle,
                });
            }
            if !resolved.contains(&handle.index) {
                resolved.push(handle.index);
            }
        }
        Ok(resolved)
    }

    /// Register a node and wire up reverse edges.
    pub fn insert(
        &mut self,
        flow: &str,
        name: String,
        kind: NodeKind<C>,
        skip: bool,
        deps: &[TaskHandle],
    ) -> Result<TaskHandle, BuildError> {
        let deps = self.resolve_deps(flow, deps)?;
        let index = self.nodes.len();

        for &dep in &deps {
            self.dependents[dep].push(index);
        }

        debug!(
            flow,
            task = %name,
            index,
            deps = ?deps,
            skip,
            "registered node"
        );

        self.nodes.push(Node {
            name,
            kind,
            skip,
            deps,
        });
        self.dependents.push(Vec::new());

        Ok(self.handle(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(graph: &mut TaskGraph<()>, deps: &[TaskHandle]) -> Result<TaskHandle, BuildError> {
        graph.insert("test", "sync".to_string(), NodeKind::SyncPoint, false, deps)
    }

    #[test]
    fn handles_follow_insertion_order() {
        let mut graph = TaskGraph::<()>::new();
        let a = sync(&mut graph, &[]).unwrap();
        let b = sync(&mut graph, &[a]).unwrap();
        let c = sync(&mut graph, &[a, b, a]).unwrap();

        assert_eq!((a.index(), b.index(), c.index()), (0, 1, 2));
        assert_eq!(graph.node(2).deps, vec![0, 1], "duplicate deps are collapsed");
        assert_eq!(graph.dependents_of(0), &[1, 2]);
        assert_eq!(graph.dependents_of(2), &[] as &[usize]);
    }

    #[test]
    fn foreign_handles_are_rejected() {
        let mut other = TaskGraph::<()>::new();
        let foreign = sync(&mut other, &[]).unwrap();

        let mut graph = TaskGraph::<()>::new();
        let err = sync(&mut graph, &[foreign]).unwrap_err();
        assert!(matches!(err, BuildError::ForeignHandle { .. }));
        assert!(graph.is_empty(), "rejected node must not be registered");
    }

    #[test]
    fn unissued_handles_are_rejected() {
        let mut graph = TaskGraph::<()>::new();
        let bogus = graph.handle(3);
        let err = sync(&mut graph, &[bogus]).unwrap_err();
        assert!(matches!(err, BuildError::UnknownHandle { .. }));
    }
}
