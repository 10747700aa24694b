// tests/operation_run.rs

#![cfg(unix)]

use std::sync::Arc;

use gardenflow::config::validate_config;
use gardenflow::fs::MockFileSystem;
use gardenflow::operation::{
    LastOperationState, LastOperationType, OperationStatus, OperationTracker, StatusStore,
};
use gardenflow::run_operation;
use gardenflow_test_utils::builders::{FlowFileBuilder, TaskConfigBuilder};
use gardenflow_test_utils::{init_tracing, with_timeout};
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn successful_run_marks_operation_succeeded() {
    init_tracing();
    let dir = tempdir().unwrap();
    let marker = dir.path().join("deployed");

    let cfg = FlowFileBuilder::new("Shoot cluster creation")
        .operation(LastOperationType::Create)
        .with_task("prepare", TaskConfigBuilder::new("true"))
        .with_task(
            "deploy",
            TaskConfigBuilder::new(&format!("touch {}", marker.display())).after(&["prepare"]),
        )
        .with_task("skip_me", TaskConfigBuilder::new("false").condition(false))
        .build();

    let tracker = OperationTracker::default();
    let state = with_timeout(run_operation(&cfg, &tracker, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(state, LastOperationState::Succeeded);
    assert!(marker.exists());

    let status = tracker.snapshot();
    let op = status.last_operation.unwrap();
    assert_eq!(op.kind, LastOperationType::Create);
    assert_eq!(op.progress, 100);
    assert_eq!(op.description, "Shoot cluster has been successfully created.");
    assert!(status.last_error.is_none());
    assert!(status.retry_cycle_start_time.is_none());
}

#[tokio::test]
async fn failing_command_marks_operation_for_retry() {
    init_tracing();

    let cfg = FlowFileBuilder::new("Shoot cluster deletion")
        .operation(LastOperationType::Delete)
        .retry_duration("1h")
        .with_task("clean", TaskConfigBuilder::new("true"))
        .with_task("destroy", TaskConfigBuilder::new("exit 4").retry("0s"))
        .with_task("after_destroy", TaskConfigBuilder::new("true").after(&["destroy"]))
        .build();

    let tracker = OperationTracker::default();
    let state = with_timeout(run_operation(&cfg, &tracker, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(state, LastOperationState::Error);

    let status = tracker.snapshot();
    let last_error = status.last_error.unwrap().description;
    assert!(last_error.starts_with("Failed to delete Shoot cluster: Shoot cluster deletion failed:"));
    assert!(last_error.contains("task 'destroy' failed"));

    let op = status.last_operation.unwrap();
    assert_eq!(op.state, LastOperationState::Error);
    assert!(op.description.ends_with(" Operation will be retried."));
    assert!(op.progress < 100);
    assert!(status.retry_cycle_start_time.is_some());
}

#[tokio::test]
async fn exhausted_retry_cycle_cancels_run_and_fails_operation() {
    init_tracing();

    let cfg = FlowFileBuilder::new("Shoot cluster reconciliation")
        .retry_duration("200ms")
        .with_task("flaky", TaskConfigBuilder::new("false").retry("50ms"))
        .build();

    // Resume a cycle that started long ago: the deadline has already passed.
    let tracker = OperationTracker::new(OperationStatus {
        retry_cycle_start_time: Some(chrono::Utc::now() - chrono::Duration::hours(1)),
        ..OperationStatus::default()
    });

    let state = with_timeout(run_operation(&cfg, &tracker, CancellationToken::new()))
        .await
        .unwrap();

    assert_eq!(state, LastOperationState::Failed);
    assert!(tracker.snapshot().retry_cycle_start_time.is_none());
}

#[tokio::test]
async fn status_survives_a_store_round_trip() {
    init_tracing();

    let cfg = validate_config(
        FlowFileBuilder::new("Shoot cluster reconciliation")
            .with_task("a", TaskConfigBuilder::new("true"))
            .raw(),
    )
    .unwrap();

    let fs = MockFileSystem::new();
    let store = StatusStore::new(Arc::new(fs.clone()), "status/shoot.json");
    let tracker = OperationTracker::new(store.load().unwrap());

    with_timeout(run_operation(&cfg, &tracker, CancellationToken::new()))
        .await
        .unwrap();
    store.save(&tracker.snapshot()).unwrap();

    let reloaded = store.load().unwrap();
    assert_eq!(reloaded, tracker.snapshot());
    assert_eq!(
        reloaded.last_operation.unwrap().state,
        LastOperationState::Succeeded
    );
}
