// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod flow;
pub mod fs;
pub mod logging;
pub mod operation;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{load_and_validate, FlowFile, NodeSpec};
use crate::errors::{GardenflowError, Result};
use crate::exec::CommandTask;
use crate::fs::RealFileSystem;
use crate::operation::{LastOperationState, OperationStatus, OperationTracker, StatusStore};

pub use crate::flow::{
    AggregateError, BuildError, CancellationError, Flow, FlowError, FlowLogger, NodeError,
    NodeState, ProgressReporter, TaskContext, TaskError, TaskHandle, TracingLogger,
};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - flow definition loading
/// - the persisted operation status
/// - flow construction and execution
/// - the retry-cycle deadline and Ctrl-C handling
///
/// Returns whether the operation succeeded.
pub async fn run(args: CliArgs) -> anyhow::Result<bool> {
    let cfg = load_and_validate(&args.config)
        .with_context(|| format!("loading flow definition {}", args.config))?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(true);
    }

    let store = StatusStore::new(Arc::new(RealFileSystem), &args.status_file);
    let tracker = OperationTracker::new(store.load()?);
    debug!(path = %store.path().display(), "operation status loaded");

    let state = run_operation(&cfg, &tracker, ctrl_c_token()).await?;

    let status = tracker.snapshot();
    store.save(&status)?;
    print_status(&status)?;

    Ok(state == LastOperationState::Succeeded)
}

/// Run one attempt of the configured operation, keeping `tracker` current.
///
/// The run is cancelled when the retry cycle runs out or `abort` fires.
pub async fn run_operation(
    cfg: &FlowFile,
    tracker: &OperationTracker,
    abort: CancellationToken,
) -> Result<LastOperationState> {
    let kind = cfg.config.operation;
    let retry_duration = cfg.config.retry_duration;

    tracker.start(kind, Utc::now());

    let mut flow = build_flow(cfg)?;
    flow.set_progress_reporter(tracker.reporter());

    let remaining = tracker.deadline(retry_duration, Utc::now());
    info!(flow = %flow.name(), ?remaining, "retry cycle deadline");
    let cancel = abort.child_token();
    let deadline = spawn_deadline(cancel.clone(), remaining);

    let result = flow.execute((), cancel).await;
    deadline.abort();

    match result {
        Ok(()) => {
            tracker.succeed(Utc::now());
            Ok(LastOperationState::Succeeded)
        }
        Err(err) => {
            let description = format!("Failed to {} Shoot cluster: {}", kind.verb(), err);
            Ok(tracker.fail(&description, retry_duration, Utc::now()))
        }
    }
}

/// Register every node of a validated definition, in its registration order.
pub fn build_flow(cfg: &FlowFile) -> Result<Flow<()>> {
    let mut flow = Flow::new(cfg.config.name.clone());
    if let Some(n) = cfg.config.max_parallel {
        flow.set_max_parallel(n);
    }

    let mut handles: HashMap<&str, TaskHandle> = HashMap::new();

    for node in cfg.nodes() {
        // Validated order puts every dependency before its dependents.
        let deps = node
            .after()
            .iter()
            .map(|dep| {
                handles.get(dep.as_str()).copied().ok_or_else(|| {
                    GardenflowError::ConfigError(format!(
                        "'{}' depends on '{}', which is not registered before it",
                        node.name(),
                        dep
                    ))
                })
            })
            .collect::<Result<Vec<TaskHandle>>>()?;

        let handle = match node {
            NodeSpec::Task(name, task) => {
                let command = Arc::new(CommandTask::new(task.cmd.clone()));
                let body = move |ctx: TaskContext<()>| {
                    let command = Arc::clone(&command);
                    async move { command.run(&ctx).await }
                };
                flow.add_task_conditional(
                    name,
                    body,
                    cfg.effective_retry(task),
                    task.condition,
                    &deps,
                )?
            }
            NodeSpec::Sync(name, _) => flow.add_sync_point(name, &deps)?,
        };
        handles.insert(node.name(), handle);
    }

    debug!(flow = %flow.name(), nodes = flow.len(), "flow built from definition");
    Ok(flow)
}

/// Cancel `cancel` once `after` has passed.
fn spawn_deadline(cancel: CancellationToken, after: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(after) => {
                warn!(?after, "retry cycle elapsed; cancelling run");
                cancel.cancel();
            }
            _ = cancel.cancelled() => {}
        }
    })
}

/// A token cancelled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        warn!("Ctrl+C received; cancelling run");
        trigger.cancel();
    });
    token
}

fn print_status(status: &OperationStatus) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(status).context("serializing status")?;
    println!("{json}");
    Ok(())
}

/// Simple dry-run output: print nodes in registration order.
fn print_dry_run(cfg: &FlowFile) {
    println!("gardenflow dry-run");
    println!("  config.name = {}", cfg.config.name);
    println!("  config.operation = {}", cfg.config.operation);
    println!("  config.retry_duration = {:?}", cfg.config.retry_duration);
    println!("  config.default_retry = {:?}", cfg.config.default_retry);
    if let Some(n) = cfg.config.max_parallel {
        println!("  config.max_parallel = {n}");
    }
    println!();

    println!("nodes ({}):", cfg.task.len() + cfg.sync.len());
    for node in cfg.nodes() {
        match node {
            NodeSpec::Task(name, task) => {
                println!("  - {name}");
                println!("      cmd: {}", task.cmd);
                println!("      retry: {:?}", cfg.effective_retry(task));
                if !task.condition {
                    println!("      condition: false (skipped)");
                }
            }
            NodeSpec::Sync(name, _) => println!("  - {name} (sync point)"),
        }
        if !node.after().is_empty() {
            println!("      after: {:?}", node.after());
        }
    }

    debug!("dry-run complete (no execution)");
}
