// src/flow/errors.rs

//! Errors produced while building and executing a flow.

use std::fmt;

use thiserror::Error;

use crate::flow::graph::TaskHandle;
use crate::flow::task::TaskError;

/// Malformed graph construction. Reported at registration time, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("flow '{flow}': dependency {handle} was issued by another flow")]
    ForeignHandle { flow: String, handle: TaskHandle },

    #[error("flow '{flow}': dependency {handle} has not been issued yet")]
    UnknownHandle { flow: String, handle: TaskHandle },

    #[error("flow '{0}' has already been executed")]
    AlreadyExecuted(String),
}

/// The run's cancellation signal fired before the node could finish.
#[derive(Error, Debug)]
#[error("{}", cancellation_message(.last_error))]
pub struct CancellationError {
    /// Error of the last attempt, if the node was waiting to retry.
    #[source]
    pub last_error: Option<TaskError>,
}

fn cancellation_message(last_error: &Option<TaskError>) -> String {
    match last_error {
        Some(err) => format!("cancelled while waiting to retry (last error: {err})"),
        None => "cancelled before execution".to_string(),
    }
}

/// Why a single node ended `Failed`.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    Cancelled(#[from] CancellationError),
}

impl NodeError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, NodeError::Cancelled(_))
    }
}

/// A failed node together with its identity.
#[derive(Error, Debug)]
#[error("task '{name}' failed: {cause}")]
pub struct NodeFailure {
    pub handle: TaskHandle,
    pub name: String,
    #[source]
    pub cause: NodeError,
}

/// Composite failure of a run. Failures are ordered by the position of the
/// node in the graph, not by completion time.
#[derive(Debug)]
pub struct AggregateError {
    flow: String,
    failures: Vec<NodeFailure>,
}

impl AggregateError {
    pub(crate) fn new(flow: String, mut failures: Vec<NodeFailure>) -> Self {
        failures.sort_by_key(|f| f.handle.index());
        Self { flow, failures }
    }

    pub fn flow(&self) -> &str {
        &self.flow
    }

    pub fn failures(&self) -> &[NodeFailure] {
        &self.failures
    }

    /// Names of the failed nodes, in graph order.
    pub fn failed_tasks(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.name.as_str()).collect()
    }

    /// Human readable description listing every failed node.
    pub fn description(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: ", self.flow)?;
        for (i, failure) in self.failures.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| f as &(dyn std::error::Error + 'static))
    }
}

/// Error returned by `Flow::execute`.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

impl FlowError {
    /// The aggregate, if the run itself failed.
    pub fn aggregate(&self) -> Option<&AggregateError> {
        match self {
            FlowError::Aggregate(agg) => Some(agg),
            FlowError::Build(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    fn failure(index: usize, name: &str, msg: &str) -> NodeFailure {
        NodeFailure {
            handle: TaskHandle::new(0, index),
            name: name.to_string(),
            cause: NodeError::Task(TaskError::retryable(anyhow!(msg.to_string()))),
        }
    }

    #[test]
    fn aggregate_lists_failures_in_graph_order() {
        let agg = AggregateError::new(
            "Shoot cluster deletion".to_string(),
            vec![
                failure(7, "Destroy DNS record", "dns timeout"),
                failure(2, "Delete monitoring", "conflict"),
            ],
        );

        assert_eq!(agg.failed_tasks(), vec!["Delete monitoring", "Destroy DNS record"]);
        assert_eq!(
            agg.description(),
            "Shoot cluster deletion failed: task 'Delete monitoring' failed: conflict; \
             task 'Destroy DNS record' failed: dns timeout"
        );
    }

    #[test]
    fn cancellation_mentions_last_error() {
        let err = CancellationError {
            last_error: Some(TaskError::retryable(anyhow!("still terminating"))),
        };
        assert_eq!(
            err.to_string(),
            "cancelled while waiting to retry (last error: still terminating)"
        );

        let err = CancellationError { last_error: None };
        assert_eq!(err.to_string(), "cancelled before execution");
    }
}
