// src/engine/mod.rs

//! Execution engine for a single flow run.
//!
//! The pure scheduler core lives in [`crate::flow::scheduler`]; this module is
//! the async shell around it:
//! - [`runtime`] owns the event loop that feeds node outcomes into the core,
//!   reacts to the cancellation signal and hands ready nodes to an executor.
//!
//! Node bodies run concurrently on executor tasks and only talk back to the
//! loop through [`NodeEvent`]s, so the loop is the single writer of all
//! per-run state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::flow::errors::NodeError;
use crate::flow::task::TaskFn;

pub mod runtime;

pub use runtime::Runtime;

/// Outcome of a dispatched node, as reported back to the scheduler.
#[derive(Debug)]
pub enum NodeOutcome {
    Succeeded,
    Failed(NodeError),
}

/// Events flowing from executor tasks into the runtime loop.
#[derive(Debug)]
pub enum NodeEvent {
    /// A node's body failed and will be retried after `retry_in`.
    AttemptFailed {
        index: usize,
        attempt: u32,
        error: String,
        retry_in: Duration,
    },
    /// A node finished for good.
    Completed { index: usize, outcome: NodeOutcome },
}

pub type NodeEventSender = mpsc::UnboundedSender<NodeEvent>;

/// Everything an executor needs to run one node.
pub struct ScheduledNode<C> {
    pub index: usize,
    pub name: String,
    pub body: TaskFn<C>,
    pub retry_interval: Duration,
    pub data: Arc<C>,
    pub cancel: CancellationToken,
}

impl<C> std::fmt::Debug for ScheduledNode<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledNode")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("retry_interval", &self.retry_interval)
            .finish_non_exhaustive()
    }
}
