use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use gardenflow::engine::{NodeEvent, NodeEventSender, NodeOutcome, ScheduledNode};
use gardenflow::exec::ExecutorBackend;
use gardenflow::flow::{NodeError, TaskError};

/// A fake executor that:
/// - records which nodes were dispatched, in dispatch order
/// - never runs a body
/// - immediately reports `Completed` for each node, failing the ones named
///   in `failing`.
#[derive(Debug, Clone, Default)]
pub struct FakeExecutor {
    executed: Arc<Mutex<Vec<String>>>,
    failing: HashSet<String>,
}

impl FakeExecutor {
    pub fn new(executed: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            executed,
            failing: HashSet::new(),
        }
    }

    /// Report `name` as failed instead of succeeded.
    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl<C> ExecutorBackend<C> for FakeExecutor {
    fn spawn_ready_nodes(&mut self, nodes: Vec<ScheduledNode<C>>, events: &NodeEventSender) {
        for node in nodes {
            self.executed.lock().unwrap().push(node.name.clone());

            let outcome = if self.failing.contains(&node.name) {
                let err = TaskError::fatal(anyhow!("fake failure of '{}'", node.name));
                NodeOutcome::Failed(NodeError::Task(err))
            } else {
                NodeOutcome::Succeeded
            };

            events
                .send(NodeEvent::Completed {
                    index: node.index,
                    outcome,
                })
                .expect("runtime event channel closed");
        }
    }
}
