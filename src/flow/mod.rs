// src/flow/mod.rs

//! Task-dependency graph and its execution façade.
//!
//! A [`Flow`] is built incrementally: every `add_*` call returns a
//! [`TaskHandle`] that later nodes can list as a dependency. Because a
//! dependency must already exist when it is referenced, the graph cannot
//! contain cycles. [`Flow::execute`] then runs the graph exactly once:
//!
//! - all ready nodes run concurrently, each on its own Tokio task
//! - a failed node withholds its dependents but never aborts siblings
//! - the logger and progress reporter are called from a single loop
//! - every failure is collected into one [`AggregateError`]

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::engine::Runtime;
use crate::exec::{ExecutorBackend, TokioExecutor};

pub mod errors;
pub mod graph;
pub mod report;
pub mod scheduler;
pub mod scheduler_step;
pub mod state;
pub mod task;

pub use errors::{
    AggregateError, BuildError, CancellationError, FlowError, NodeError, NodeFailure,
};
pub use graph::TaskHandle;
pub use report::{FlowLogger, ProgressReporter, TracingLogger};
pub use state::NodeState;
pub use task::{TaskContext, TaskError, TaskFn, TaskFuture};

use graph::{NodeKind, TaskGraph};
use report::Notifier;
use scheduler::Scheduler;
use task::boxed_task;

/// A named, single-use task-dependency graph.
///
/// `C` is the caller's context type. Every body receives it (as `Arc<C>`)
/// inside its [`TaskContext`].
pub struct Flow<C> {
    name: String,
    graph: TaskGraph<C>,
    logger: Arc<dyn FlowLogger>,
    reporter: Option<Box<dyn ProgressReporter>>,
    max_parallel: Option<usize>,
    /// Final node states; `Some` once the flow has been executed.
    final_states: Option<Vec<NodeState>>,
}

impl<C> Flow<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            logger: Arc::new(TracingLogger::new(name.clone())),
            name,
            graph: TaskGraph::new(),
            reporter: None,
            max_parallel: None,
            final_states: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn is_executed(&self) -> bool {
        self.final_states.is_some()
    }

    pub fn set_logger(&mut self, logger: impl FlowLogger + 'static) -> &mut Self {
        self.logger = Arc::new(logger);
        self
    }

    pub fn set_progress_reporter(&mut self, reporter: impl ProgressReporter + 'static) -> &mut Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Cap the number of bodies running at the same time. Unbounded by default.
    pub fn set_max_parallel(&mut self, max_parallel: usize) -> &mut Self {
        self.max_parallel = Some(max_parallel.max(1));
        self
    }

    /// Register an unconditional task.
    ///
    /// A zero `retry_interval` means a single attempt.
    pub fn add_task<F, Fut>(
        &mut self,
        name: impl Into<String>,
        body: F,
        retry_interval: Duration,
        deps: &[TaskHandle],
    ) -> Result<TaskHandle, BuildError>
    where
        F: Fn(TaskContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.add_task_conditional(name, body, retry_interval, true, deps)
    }

    /// Register a task that is skipped when `condition` is false.
    ///
    /// The condition is evaluated here, once. A skipped node never runs its
    /// body and counts as satisfied for its dependents.
    pub fn add_task_conditional<F, Fut>(
        &mut self,
        name: impl Into<String>,
        body: F,
        retry_interval: Duration,
        condition: bool,
        deps: &[TaskHandle],
    ) -> Result<TaskHandle, BuildError>
    where
        F: Fn(TaskContext<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.ensure_not_executed()?;
        let kind = NodeKind::Task {
            body: boxed_task(body),
            retry_interval,
        };
        self.graph
            .insert(&self.name, name.into(), kind, !condition, deps)
    }

    /// Register a barrier joining `deps` into one handle.
    pub fn add_sync_point(
        &mut self,
        name: impl Into<String>,
        deps: &[TaskHandle],
    ) -> Result<TaskHandle, BuildError> {
        self.ensure_not_executed()?;
        self.graph
            .insert(&self.name, name.into(), NodeKind::SyncPoint, false, deps)
    }

    /// State of a node: `Pending` before execution, its final state after.
    ///
    /// Returns `None` for handles issued by another flow.
    pub fn state_of(&self, handle: TaskHandle) -> Option<NodeState> {
        if !self.graph.owns(handle) {
            return None;
        }
        match &self.final_states {
            Some(states) => states.get(handle.index()).copied(),
            None => Some(NodeState::Pending),
        }
    }

    /// Run the graph to completion on Tokio tasks.
    ///
    /// Cancelling `cancel` stops new work from starting and interrupts retry
    /// sleeps; bodies already mid-attempt are awaited.
    pub async fn execute(
        &mut self,
        data: impl Into<Arc<C>>,
        cancel: CancellationToken,
    ) -> Result<(), FlowError> {
        let executor = match self.max_parallel {
            Some(n) => TokioExecutor::with_max_parallel(n),
            None => TokioExecutor::new(),
        };
        self.execute_with(data, cancel, executor).await
    }

    /// Like [`execute`](Self::execute) but with a custom executor backend.
    pub async fn execute_with<E>(
        &mut self,
        data: impl Into<Arc<C>>,
        cancel: CancellationToken,
        executor: E,
    ) -> Result<(), FlowError>
    where
        E: ExecutorBackend<C>,
    {
        self.ensure_not_executed()?;
        // Mark as executed up front so a second call never schedules anything.
        self.final_states = Some(vec![NodeState::Pending; self.graph.len()]);

        info!(flow = %self.name, nodes = self.graph.len(), "executing flow");

        let scheduler = Scheduler::from_graph(&self.name, &self.graph);
        let reporter = match self.reporter.as_mut() {
            Some(r) => {
                let r: &mut dyn ProgressReporter = &mut **r;
                Some(r)
            }
            None => None,
        };
        let mut notifier = Notifier::new(Arc::clone(&self.logger), reporter);

        let runtime = Runtime::new(&self.graph, scheduler, data.into(), cancel, executor);
        let scheduler = runtime.run(&mut notifier).await;

        let (states, err) = scheduler.into_result();
        self.final_states = Some(states);

        match err {
            None => {
                info!(flow = %self.name, "flow succeeded");
                Ok(())
            }
            Some(err) => {
                warn!(flow = %self.name, failed = ?err.failed_tasks(), "flow failed");
                Err(FlowError::Aggregate(err))
            }
        }
    }

    fn ensure_not_executed(&self) -> Result<(), BuildError> {
        if self.is_executed() {
            return Err(BuildError::AlreadyExecuted(self.name.clone()));
        }
        Ok(())
    }
}

impl<C> fmt::Debug for Flow<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes: Vec<String> = self
            .graph
            .nodes()
            .map(|n| {
                if n.is_sync_point() {
                    format!("{} (sync)", n.name)
                } else {
                    format!("{} (retry {:?})", n.name, n.retry_interval())
                }
            })
            .collect();
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("nodes", &nodes)
            .field("max_parallel", &self.max_parallel)
            .field("executed", &self.final_states.is_some())
            .finish()
    }
}
