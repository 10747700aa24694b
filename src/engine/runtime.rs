// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Level};

use crate::exec::ExecutorBackend;
use crate::flow::graph::{NodeKind, TaskGraph};
use crate::flow::report::Notifier;
use crate::flow::scheduler::Scheduler;
use crate::flow::scheduler_step::SchedulerStep;

use super::{NodeEvent, NodeEventSender, ScheduledNode};

/// Drives the scheduler core in response to [`NodeEvent`]s and delegates
/// running node bodies to an [`ExecutorBackend`].
///
/// The loop is the only place that mutates per-run state and the only place
/// that calls the logger and progress reporter, which gives those calls a
/// total order.
pub struct Runtime<'g, C, E> {
    graph: &'g TaskGraph<C>,
    scheduler: Scheduler,
    data: Arc<C>,
    cancel: CancellationToken,
    event_tx: NodeEventSender,
    event_rx: mpsc::UnboundedReceiver<NodeEvent>,
    executor: E,
}

impl<C, E> fmt::Debug for Runtime<'_, C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

impl<'g, C, E> Runtime<'g, C, E>
where
    C: Send + Sync + 'static,
    E: ExecutorBackend<C>,
{
    pub(crate) fn new(
        graph: &'g TaskGraph<C>,
        scheduler: Scheduler,
        data: Arc<C>,
        cancel: CancellationToken,
        executor: E,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            graph,
            scheduler,
            data,
            cancel,
            event_tx,
            event_rx,
            executor,
        }
    }

    /// Main event loop. Returns the scheduler once nothing is in flight.
    ///
    /// - Seeds the run with the graph's roots.
    /// - Feeds completions into the core and dispatches newly ready nodes.
    /// - Marks the core cancelled when the signal fires, then keeps draining
    ///   completions from bodies that were already running.
    pub(crate) async fn run(mut self, notifier: &mut Notifier<'_>) -> Scheduler {
        info!(nodes = self.scheduler.len(), "flow runtime started");

        let step = self.scheduler.start();
        self.apply(step, notifier);

        let mut cancel_seen = false;

        while !self.scheduler.is_finished() {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled(), if !cancel_seen => {
                    cancel_seen = true;
                    self.scheduler.cancel();
                    notifier.log(
                        Level::WARN,
                        &format!(
                            "Cancellation requested; waiting for {} running task(s) to return",
                            self.scheduler.running()
                        ),
                    );
                }

                event = self.event_rx.recv() => {
                    // We hold a sender ourselves, so the channel never closes.
                    let Some(event) = event else { break };
                    self.handle_event(event, notifier);
                }
            }
        }

        info!(
            percent = self.scheduler.percent(),
            cancelled = self.scheduler.is_cancelled(),
            "flow runtime finished"
        );
        self.scheduler
    }

    fn handle_event(&mut self, event: NodeEvent, notifier: &mut Notifier<'_>) {
        match event {
            NodeEvent::AttemptFailed {
                index,
                attempt,
                error,
                retry_in,
            } => {
                let name = self.scheduler.name_of(index).unwrap_or("<unknown>");
                notifier.log(
                    Level::WARN,
                    &format!(
                        "Attempt {attempt} of '{name}' failed, retrying in {retry_in:?}: {error}"
                    ),
                );
            }
            NodeEvent::Completed { index, outcome } => {
                debug!(index, ?outcome, "runtime received completion");
                let step = self.scheduler.step_completion(index, outcome);
                self.apply(step, notifier);
            }
        }
    }

    /// Report terminal transitions and dispatch newly scheduled nodes.
    fn apply(&mut self, step: SchedulerStep, notifier: &mut Notifier<'_>) {
        for completion in &step.completions {
            notifier.node_finished(completion);
        }

        if step.newly_scheduled.is_empty() {
            return;
        }

        let nodes: Vec<ScheduledNode<C>> = step
            .newly_scheduled
            .iter()
            .filter_map(|&index| self.scheduled_node(index))
            .collect();

        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        debug!(?names, "dispatching ready nodes");

        self.executor.spawn_ready_nodes(nodes, &self.event_tx);
    }

    fn scheduled_node(&self, index: usize) -> Option<ScheduledNode<C>> {
        let node = self.graph.node(index);
        match &node.kind {
            NodeKind::Task {
                body,
                retry_interval,
            } => Some(ScheduledNode {
                index,
                name: node.name.clone(),
                body: Arc::clone(body),
                retry_interval: *retry_interval,
                data: Arc::clone(&self.data),
                cancel: self.cancel.clone(),
            }),
            // Sync points are resolved by the core and never scheduled.
            NodeKind::SyncPoint => None,
        }
    }
}
