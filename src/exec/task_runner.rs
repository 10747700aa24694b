// src/exec/task_runner.rs

//! Runs one scheduled node to a final outcome, retrying as configured.

use tracing::{debug, info, warn};

use crate::engine::{NodeEvent, NodeEventSender, NodeOutcome, ScheduledNode};
use crate::exec::retry::{RetryDecision, RetryPolicy};
use crate::flow::errors::{CancellationError, NodeError};
use crate::flow::task::TaskContext;

/// Run a node and emit exactly one `Completed` event for it.
///
/// Attempts are strictly sequential, so a body is never in flight twice.
pub async fn run_node<C>(node: ScheduledNode<C>, events: NodeEventSender)
where
    C: Send + Sync + 'static,
{
    let index = node.index;
    let outcome = attempt_until_done(&node, &events).await;

    match &outcome {
        NodeOutcome::Succeeded => debug!(task = %node.name, "node succeeded"),
        NodeOutcome::Failed(err) => debug!(task = %node.name, error = %err, "node failed"),
    }

    // The receiver only goes away once the run is over.
    let _ = events.send(NodeEvent::Completed { index, outcome });
}

async fn attempt_until_done<C>(node: &ScheduledNode<C>, events: &NodeEventSender) -> NodeOutcome
where
    C: Send + Sync + 'static,
{
    let policy = RetryPolicy::new(node.retry_interval);
    let mut attempt: u32 = 0;

    loop {
        if node.cancel.is_cancelled() {
            info!(task = %node.name, attempt, "run cancelled before attempt; not starting body");
            return NodeOutcome::Failed(NodeError::Cancelled(CancellationError {
                last_error: None,
            }));
        }

        attempt += 1;
        let ctx = TaskContext {
            data: node.data.clone(),
            task: node.name.clone(),
            attempt,
            cancel: node.cancel.clone(),
        };

        debug!(task = %node.name, attempt, "invoking task body");

        let err = match (node.body)(ctx).await {
            Ok(()) => return NodeOutcome::Succeeded,
            Err(err) => err,
        };

        match policy.decide(err, &node.cancel) {
            RetryDecision::GiveUp(cause) => return NodeOutcome::Failed(cause),
            RetryDecision::RetryAfter { after, last_error } => {
                warn!(
                    task = %node.name,
                    attempt,
                    retry_in = ?after,
                    error = %last_error,
                    "attempt failed; will retry"
                );
                let _ = events.send(NodeEvent::AttemptFailed {
                    index: node.index,
                    attempt,
                    error: last_error.to_string(),
                    retry_in: after,
                });

                if !policy.wait(&node.cancel).await {
                    return NodeOutcome::Failed(NodeError::Cancelled(CancellationError {
                        last_error: Some(last_error),
                    }));
                }
            }
        }
    }
}
