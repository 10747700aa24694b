// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of spawning node bodies
//! itself. This makes it easy to swap in a fake executor in tests while
//! keeping the production implementation in [`TokioExecutor`].
//!
//! - `TokioExecutor` is the default implementation used by `Flow::execute`.
//!   It spawns one Tokio task per ready node, optionally bounded by a
//!   semaphore, and reports back over the node event channel.
//! - Tests can provide their own `ExecutorBackend` that, for example, records
//!   which nodes were scheduled and directly emits `Completed` events.

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::Semaphore;
use tracing::{debug, error};

use crate::engine::{NodeEvent, NodeEventSender, NodeOutcome, ScheduledNode};
use crate::exec::task_runner::run_node;
use crate::flow::errors::NodeError;
use crate::flow::task::TaskError;

/// Trait abstracting how scheduled nodes are executed.
///
/// Every node handed to `spawn_ready_nodes` must eventually produce exactly
/// one [`NodeEvent::Completed`] on `events`, otherwise the run never ends.
pub trait ExecutorBackend<C>: Send {
    fn spawn_ready_nodes(&mut self, nodes: Vec<ScheduledNode<C>>, events: &NodeEventSender);
}

/// Production executor: one Tokio task per node.
#[derive(Debug, Clone, Default)]
pub struct TokioExecutor {
    limit: Option<Arc<Semaphore>>,
}

impl TokioExecutor {
    /// Executor without a cap on concurrently running bodies.
    pub fn new() -> Self {
        Self { limit: None }
    }

    /// Executor running at most `max_parallel` bodies at a time.
    pub fn with_max_parallel(max_parallel: usize) -> Self {
        Self {
            limit: Some(Arc::new(Semaphore::new(max_parallel.max(1)))),
        }
    }
}

impl<C> ExecutorBackend<C> for TokioExecutor
where
    C: Send + Sync + 'static,
{
    fn spawn_ready_nodes(&mut self, nodes: Vec<ScheduledNode<C>>, events: &NodeEventSender) {
        for node in nodes {
            let events = events.clone();
            let limit = self.limit.clone();

            tokio::spawn(async move {
                // Held until the node finished all of its attempts.
                let _permit = match limit {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };

                let index = node.index;
                let name = node.name.clone();
                debug!(task = %name, "spawning node");

                // Run the body on its own task so a panic surfaces as a
                // failure instead of a missing completion.
                let inner = tokio::spawn(run_node(node, events.clone()));
                if let Err(join_err) = inner.await {
                    error!(task = %name, error = %join_err, "node task panicked");
                    let cause = TaskError::fatal(anyhow!("task panicked: {join_err}"));
                    let _ = events.send(NodeEvent::Completed {
                        index,
                        outcome: NodeOutcome::Failed(NodeError::Task(cause)),
                    });
                }
            });
        }
    }
}
