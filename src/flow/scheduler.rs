// src/flow/scheduler.rs

use std::collections::VecDeque;

use tracing::{debug, info, warn};

use crate::engine::NodeOutcome;
use crate::flow::errors::{AggregateError, CancellationError, NodeError, NodeFailure};
use crate::flow::graph::{TaskGraph, TaskHandle};
use crate::flow::scheduler_step::{Completion, SchedulerStep};
use crate::flow::state::{NodeInfo, NodeState, StateManager};

/// Pure scheduler core for a single run.
///
/// It owns every piece of mutable per-run bookkeeping (node states,
/// completion counters, failures) and is only ever driven by one writer, the
/// engine runtime loop. It has no channels, timers or tasks, so it can be
/// stepped by hand in tests.
///
/// It is responsible for:
/// - deciding when a node is ready (all deps `Succeeded` or `Skipped`)
/// - resolving skipped nodes and sync points without dispatching anything
/// - withholding dependents of failed nodes (fail-fast, not fail-hard)
/// - computing progress after every terminal transition
#[derive(Debug)]
pub struct Scheduler {
    flow: String,
    nodes: Vec<NodeInfo>,
    states: Vec<NodeState>,
    failures: Vec<NodeFailure>,
    handles: Vec<TaskHandle>,
    running: usize,
    completed: usize,
    failed: usize,
    cancelled: bool,
    started: bool,
}

impl Scheduler {
    pub(crate) fn from_graph<C>(flow: &str, graph: &TaskGraph<C>) -> Self {
        let nodes = NodeInfo::from_graph(graph);
        let handles = (0..nodes.len()).map(|i| graph.handle(i)).collect();
        Self {
            flow: flow.to_string(),
            states: vec![NodeState::Pending; nodes.len()],
            nodes,
            failures: Vec::new(),
            handles,
            running: 0,
            completed: 0,
            failed: 0,
            cancelled: false,
            started: false,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.nodes.get(index).map(|n| n.name.as_str())
    }

    pub fn state_of(&self, index: usize) -> Option<NodeState> {
        self.states.get(index).copied()
    }

    pub fn states(&self) -> &[NodeState] {
        &self.states
    }

    /// Number of nodes whose body is in flight.
    pub fn running(&self) -> usize {
        self.running
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// True once the run started and nothing is running or ready.
    ///
    /// Ready nodes are resolved within the step that promoted them, so only
    /// the running counter matters here.
    pub fn is_finished(&self) -> bool {
        self.started && self.running == 0
    }

    /// `floor(100 * completed / total)`, capped at 99 once anything failed so
    /// that 100 means full success.
    pub fn percent(&self) -> u8 {
        if self.nodes.is_empty() {
            return 100;
        }
        let percent = (100 * self.completed / self.nodes.len()) as u8;
        if self.failed > 0 {
            percent.min(99)
        } else {
            percent
        }
    }

    /// Promote the roots and resolve everything that needs no dispatch.
    pub fn start(&mut self) -> SchedulerStep {
        if self.started {
            warn!(flow = %self.flow, "scheduler already started; ignoring");
            return self.empty_step();
        }
        self.started = true;

        debug!(flow = %self.flow, nodes = self.nodes.len(), "scheduler: starting run");

        let roots = StateManager::new(&self.nodes, &mut self.states).promote_roots();
        let mut step = SchedulerStep::default();
        self.resolve_ready(roots, &mut step);
        step.run_finished = self.is_finished();
        step
    }

    /// Record that the cancellation signal fired.
    ///
    /// Running bodies are left alone; nodes that become ready from now on are
    /// failed instead of dispatched.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            info!(
                flow = %self.flow,
                running = self.running,
                "scheduler: cancellation requested; no new nodes will be dispatched"
            );
        }
        self.cancelled = true;
    }

    /// Handle the outcome of a dispatched node.
    pub fn step_completion(&mut self, index: usize, outcome: NodeOutcome) -> SchedulerStep {
        match self.states.get(index) {
            Some(NodeState::Running) => {}
            Some(state) => {
                warn!(
                    flow = %self.flow,
                    index,
                    ?state,
                    "completion for node that is not running; ignoring"
                );
                return self.empty_step();
            }
            None => {
                warn!(flow = %self.flow, index, "completion for unknown node; ignoring");
                return self.empty_step();
            }
        }

        self.running -= 1;
        let mut step = SchedulerStep::default();

        match outcome {
            NodeOutcome::Succeeded => {
                let ready = self.finish(index, NodeState::Succeeded, None, &mut step);
                self.resolve_ready(ready, &mut step);
            }
            NodeOutcome::Failed(cause) => {
                warn!(
                    flow = %self.flow,
                    task = %self.nodes[index].name,
                    error = %cause,
                    "node failed; its dependents will not be scheduled"
                );
                self.finish(index, NodeState::Failed, Some(cause), &mut step);
            }
        }

        step.run_finished = self.is_finished();
        step
    }

    /// Final node states plus the aggregated error, if any node failed.
    pub fn into_result(mut self) -> (Vec<NodeState>, Option<AggregateError>) {
        let blocked: Vec<&str> = StateManager::new(&self.nodes, &mut self.states)
            .blocked()
            .into_iter()
            .map(|index| self.nodes[index].name.as_str())
            .collect();
        if !blocked.is_empty() {
            debug!(flow = %self.flow, ?blocked, "nodes left pending behind a failure");
        }

        let err = if self.failures.is_empty() {
            None
        } else {
            Some(AggregateError::new(self.flow, self.failures))
        };
        (self.states, err)
    }

    /// Drive freshly promoted nodes forward until everything left either needs
    /// dispatching or is waiting on something in flight.
    fn resolve_ready(&mut self, ready: Vec<usize>, step: &mut SchedulerStep) {
        let mut queue = VecDeque::from(ready);
        while let Some(index) = queue.pop_front() {
            let info = &self.nodes[index];

            if info.skip {
                debug!(flow = %self.flow, task = %info.name, "condition is false; skipping");
                let ready = self.finish(index, NodeState::Skipped, None, step);
                queue.extend(ready);
            } else if info.sync_point {
                let ready = self.finish(index, NodeState::Succeeded, None, step);
                queue.extend(ready);
            } else if self.cancelled {
                let cause = NodeError::Cancelled(CancellationError { last_error: None });
                self.finish(index, NodeState::Failed, Some(cause), step);
            } else {
                debug!(flow = %self.flow, task = %info.name, "dependencies satisfied; marking Running");
                self.states[index] = NodeState::Running;
                self.running += 1;
                step.newly_scheduled.push(index);
            }
        }
    }

    /// Move a node into a terminal state and return the dependents that
    /// became ready as a consequence.
    fn finish(
        &mut self,
        index: usize,
        state: NodeState,
        cause: Option<NodeError>,
        step: &mut SchedulerStep,
    ) -> Vec<usize> {
        debug_assert!(state.is_terminal());

        self.completed += 1;
        if state == NodeState::Failed {
            self.failed += 1;
        }

        let mut manager = StateManager::new(&self.nodes, &mut self.states);
        manager.set(index, state);
        let ready = if state.satisfies_dependents() {
            manager.promote_dependents(index)
        } else {
            Vec::new()
        };

        let name = self.nodes[index].name.clone();
        let description = match (&cause, state, self.nodes[index].sync_point) {
            (Some(err), _, _) => format!("Failed '{name}': {err}"),
            (None, NodeState::Skipped, _) => format!("Skipped '{name}'"),
            (None, _, true) => format!("Reached sync point '{name}'"),
            (None, _, false) => format!("Executed '{name}'"),
        };

        if let Some(cause) = cause {
            self.failures.push(NodeFailure {
                handle: self.handles[index],
                name: name.clone(),
                cause,
            });
        }

        step.completions.push(Completion {
            index,
            name,
            state,
            description,
            percent: self.percent(),
        });

        ready
    }

    fn empty_step(&self) -> SchedulerStep {
        SchedulerStep {
            run_finished: self.is_finished(),
            ..SchedulerStep::default()
        }
    }
}
