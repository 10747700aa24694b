// tests/flow_scenarios.rs

use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gardenflow::flow::{Flow, FlowError, FlowLogger, NodeError, NodeState, TaskError};
use gardenflow_test_utils::bodies::{Behaviour, Recorder};
use gardenflow_test_utils::{init_tracing, with_timeout};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Level;

type TestResult = Result<(), Box<dyn Error>>;

/// Logger that keeps every line for later assertions.
#[derive(Debug, Clone, Default)]
struct MemoryLogger {
    lines: Arc<Mutex<Vec<(Level, String)>>>,
}

impl FlowLogger for MemoryLogger {
    fn log(&self, level: Level, message: &str) {
        self.lines.lock().unwrap().push((level, message.to_string()));
    }
}

impl MemoryLogger {
    fn contains(&self, needle: &str) -> bool {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .any(|(_, line)| line.contains(needle))
    }
}

fn progress_sink(flow: &mut Flow<()>) -> Arc<Mutex<Vec<(u8, String)>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    flow.set_progress_reporter(move |percent: u8, description: &str| {
        sink.lock().unwrap().push((percent, description.to_string()));
    });
    reports
}

#[tokio::test]
async fn skipped_conditional_does_not_run_and_does_not_block() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let logger = MemoryLogger::default();

    let mut flow = Flow::<()>::new("scenario A");
    flow.set_logger(logger.clone());
    let a = flow.add_task("A", rec.body("A", Behaviour::Succeed), Duration::ZERO, &[])?;
    let b = flow.add_task_conditional("B", rec.body("B", Behaviour::Succeed), Duration::ZERO, false, &[a])?;
    let c = flow.add_task("C", rec.body("C", Behaviour::Succeed), Duration::ZERO, &[a, b])?;

    with_timeout(flow.execute((), CancellationToken::new())).await?;

    assert_eq!(flow.state_of(a), Some(NodeState::Succeeded));
    assert_eq!(flow.state_of(b), Some(NodeState::Skipped));
    assert_eq!(flow.state_of(c), Some(NodeState::Succeeded));
    assert_eq!(rec.calls("B"), 0);
    assert_eq!(rec.calls("C"), 1);
    assert_eq!(rec.finish_order(), vec!["A", "C"]);
    assert!(logger.contains("Skipped 'B'"));
    assert!(logger.contains("Executed 'C'"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retrying_task_succeeds_on_third_attempt() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("scenario B");
    let x = flow.add_task(
        "X",
        rec.body("X", Behaviour::FailTimes(2)),
        Duration::from_millis(50),
        &[],
    )?;

    with_timeout(flow.execute((), CancellationToken::new())).await?;

    let starts = rec.starts("X");
    assert_eq!(starts.len(), 3);
    assert!(starts[2] - starts[0] >= Duration::from_millis(100));
    assert_eq!(flow.state_of(x), Some(NodeState::Succeeded));
    assert!(!rec.saw_overlap());
    Ok(())
}

#[tokio::test]
async fn failed_branch_blocks_sync_point_but_not_siblings() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let logger = MemoryLogger::default();

    let mut flow = Flow::<()>::new("scenario C");
    flow.set_logger(logger.clone());
    let p = flow.add_task("P", rec.body("P", Behaviour::Succeed), Duration::ZERO, &[])?;
    let q = flow.add_task("Q", rec.body("Q", Behaviour::Succeed), Duration::ZERO, &[])?;
    let r = flow.add_task("R", rec.body("R", Behaviour::AlwaysFail), Duration::ZERO, &[])?;
    let s = flow.add_sync_point("S", &[p, q, r])?;
    let t = flow.add_task("T", rec.body("T", Behaviour::Succeed), Duration::ZERO, &[s])?;

    let err = with_timeout(flow.execute((), CancellationToken::new()))
        .await
        .unwrap_err();

    let agg = err.aggregate().expect("run failure");
    assert_eq!(agg.failed_tasks(), vec!["R"]);
    assert!(err.to_string().contains("task 'R' failed"));

    assert_eq!(flow.state_of(p), Some(NodeState::Succeeded));
    assert_eq!(flow.state_of(q), Some(NodeState::Succeeded));
    assert_eq!(flow.state_of(r), Some(NodeState::Failed));
    assert_eq!(flow.state_of(s), Some(NodeState::Pending));
    assert_eq!(flow.state_of(t), Some(NodeState::Pending));
    assert_eq!(rec.calls("T"), 0);
    assert_eq!(rec.calls("R"), 1);
    assert!(logger.contains("Failed 'R'"));
    assert!(!logger.contains("Reached sync point 'S'"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn cancellation_during_retry_sleep_fails_node_promptly() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("scenario D");
    let y = flow.add_task("Y", rec.body("Y", Behaviour::AlwaysFail), Duration::from_secs(1), &[])?;
    let z = flow.add_task("Z", rec.body("Z", Behaviour::Succeed), Duration::ZERO, &[y])?;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = with_timeout(flow.execute((), cancel)).await.unwrap_err();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(rec.calls("Y"), 1);
    assert_eq!(rec.calls("Z"), 0);
    assert_eq!(flow.state_of(y), Some(NodeState::Failed));
    assert_eq!(flow.state_of(z), Some(NodeState::Pending));

    let failure = &err.aggregate().expect("run failure").failures()[0];
    match &failure.cause {
        NodeError::Cancelled(c) => assert!(c.last_error.is_some()),
        other => panic!("expected cancellation, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn already_cancelled_run_invokes_no_bodies() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("pre-cancelled");
    let a = flow.add_task("A", rec.body("A", Behaviour::Succeed), Duration::ZERO, &[])?;
    let s = flow.add_sync_point("S", &[])?;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = with_timeout(flow.execute((), cancel)).await.unwrap_err();

    assert_eq!(rec.calls("A"), 0);
    assert_eq!(flow.state_of(a), Some(NodeState::Failed));
    assert_eq!(flow.state_of(s), Some(NodeState::Succeeded));
    assert!(err.aggregate().unwrap().failures()[0].cause.is_cancellation());
    Ok(())
}

#[tokio::test]
async fn progress_is_monotonic_and_ends_at_100_on_success() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("progress");
    let reports = progress_sink(&mut flow);
    let a = flow.add_task("A", rec.body("A", Behaviour::Succeed), Duration::ZERO, &[])?;
    let b = flow.add_task("B", rec.body("B", Behaviour::Succeed), Duration::ZERO, &[a])?;
    let c = flow.add_task_conditional("C", rec.body("C", Behaviour::Succeed), Duration::ZERO, false, &[a])?;
    flow.add_sync_point("done", &[b, c])?;

    with_timeout(flow.execute((), CancellationToken::new())).await?;

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 4);
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(reports.last().unwrap(), &(100, "Reached sync point 'done'".to_string()));
    Ok(())
}

#[tokio::test]
async fn progress_never_reaches_100_when_run_fails() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("progress failure");
    let reports = progress_sink(&mut flow);
    flow.add_task("A", rec.body("A", Behaviour::Succeed), Duration::ZERO, &[])?;
    flow.add_task("B", rec.body("B", Behaviour::Fatal), Duration::from_secs(10), &[])?;

    let res = with_timeout(flow.execute((), CancellationToken::new())).await;
    assert!(matches!(res, Err(FlowError::Aggregate(_))));

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|(p, _)| *p < 100));
    Ok(())
}

#[tokio::test]
async fn aggregate_lists_failures_in_registration_order() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("Shoot cluster deletion");
    // "first" takes longer, so it finishes after "second".
    flow.add_task(
        "first",
        {
            let rec = rec.clone();
            move |ctx| {
                let body = rec.body::<()>("first", Behaviour::Sleep(Duration::from_millis(50)));
                async move {
                    body(ctx).await?;
                    Err::<(), TaskError>(TaskError::retryable(anyhow::anyhow!("late failure")))
                }
            }
        },
        Duration::ZERO,
        &[],
    )?;
    flow.add_task("second", rec.body("second", Behaviour::Fatal), Duration::ZERO, &[])?;

    let err = with_timeout(flow.execute((), CancellationToken::new()))
        .await
        .unwrap_err();
    let agg = err.aggregate().unwrap();

    assert_eq!(agg.failed_tasks(), vec!["first", "second"]);
    let text = agg.description();
    assert!(text.starts_with("Shoot cluster deletion failed: task 'first' failed: late failure"));
    assert!(text.contains("; task 'second' failed"));
    assert!(std::error::Error::source(agg).is_some());
    Ok(())
}

#[tokio::test]
async fn parallelism_cap_limits_running_bodies() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("capped");
    flow.set_max_parallel(2);
    for i in 0..6 {
        let name = format!("n{i}");
        flow.add_task(
            name.as_str(),
            rec.body(&name, Behaviour::Sleep(Duration::from_millis(20))),
            Duration::ZERO,
            &[],
        )?;
    }

    with_timeout(flow.execute((), CancellationToken::new())).await?;

    assert_eq!(rec.finish_order().len(), 6);
    assert!(rec.max_running() <= 2);
    Ok(())
}

#[tokio::test]
async fn independent_branches_run_concurrently_without_cap() -> TestResult {
    init_tracing();
    let rec = Recorder::new();

    let mut flow = Flow::<()>::new("wide");
    for i in 0..4 {
        let name = format!("n{i}");
        flow.add_task(
            name.as_str(),
            rec.body(&name, Behaviour::Sleep(Duration::from_millis(100))),
            Duration::ZERO,
            &[],
        )?;
    }

    with_timeout(flow.execute((), CancellationToken::new())).await?;
    assert_eq!(rec.max_running(), 4);
    Ok(())
}

#[tokio::test]
async fn bodies_see_caller_data_and_attempt_numbers() -> TestResult {
    init_tracing();

    #[derive(Debug, Default)]
    struct Shoot {
        seen: Mutex<Vec<(String, u32)>>,
    }

    let mut flow = Flow::<Shoot>::new("context");
    flow.add_task(
        "deploy",
        |ctx| async move {
            ctx.data.seen.lock().unwrap().push((ctx.task.clone(), ctx.attempt));
            if ctx.attempt < 2 {
                return Err(TaskError::retryable(anyhow::anyhow!("not yet")));
            }
            Ok(())
        },
        Duration::from_millis(5),
        &[],
    )?;

    let shoot = Arc::new(Shoot::default());
    with_timeout(flow.execute(Arc::clone(&shoot), CancellationToken::new())).await?;

    let seen = shoot.seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![("deploy".to_string(), 1), ("deploy".to_string(), 2)]
    );
    Ok(())
}

#[tokio::test]
async fn panicking_body_fails_its_node() -> TestResult {
    init_tracing();

    let mut flow = Flow::<()>::new("panic");
    let boom = flow.add_task(
        "boom",
        |_ctx| async move {
            if true {
                panic!("body exploded");
            }
            Ok::<(), TaskError>(())
        },
        Duration::from_secs(1),
        &[],
    )?;

    let err = with_timeout(flow.execute((), CancellationToken::new()))
        .await
        .unwrap_err();
    assert_eq!(err.aggregate().unwrap().failed_tasks(), vec!["boom"]);
    assert_eq!(flow.state_of(boom), Some(NodeState::Failed));
    Ok(())
}
