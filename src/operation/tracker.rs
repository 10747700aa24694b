// src/operation/tracker.rs

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::flow::ProgressReporter;
use crate::operation::status::{
    LastError, LastOperation, LastOperationState, LastOperationType, OperationStatus,
};

/// Maintains an [`OperationStatus`] across one operation attempt.
///
/// Clones share the same record, so the reporter handed to a flow and the
/// tracker kept by the caller see the same updates.
#[derive(Debug, Clone, Default)]
pub struct OperationTracker {
    status: Arc<Mutex<OperationStatus>>,
}

impl OperationTracker {
    /// Resume from a previously persisted record.
    pub fn new(status: OperationStatus) -> Self {
        Self {
            status: Arc::new(Mutex::new(status)),
        }
    }

    /// Copy of the current record.
    pub fn snapshot(&self) -> OperationStatus {
        self.lock().clone()
    }

    /// Mark the operation as started.
    ///
    /// A new retry cycle begins if none is running or the previous operation
    /// was of another type.
    pub fn start(&self, kind: LastOperationType, now: DateTime<Utc>) {
        let mut status = self.lock();

        let other_type = status
            .last_operation
            .as_ref()
            .is_some_and(|op| op.kind != kind);
        if status.retry_cycle_start_time.is_none() || other_type {
            status.retry_cycle_start_time = Some(now);
        }

        status.last_operation = Some(LastOperation {
            kind,
            state: LastOperationState::Processing,
            progress: 1,
            description: format!("{} of Shoot cluster in progress.", kind.noun()),
            last_update_time: now,
        });

        info!(operation = %kind, "operation started");
    }

    /// A progress reporter writing into this record.
    pub fn reporter(&self) -> TrackerReporter {
        TrackerReporter {
            tracker: self.clone(),
        }
    }

    pub fn succeed(&self, now: DateTime<Utc>) {
        let mut status = self.lock();
        let kind = current_kind(&status);

        status.retry_cycle_start_time = None;
        status.last_error = None;
        status.last_operation = Some(LastOperation {
            kind,
            state: LastOperationState::Succeeded,
            progress: 100,
            description: format!("Shoot cluster has been successfully {}.", kind.past()),
            last_update_time: now,
        });

        info!(operation = %kind, "operation succeeded");
    }

    /// Record a failed attempt and return the resulting state.
    ///
    /// Within the retry cycle the state is `Error` (will be retried); once the
    /// cycle has elapsed it is `Failed` and the cycle is cleared.
    pub fn fail(
        &self,
        description: &str,
        retry_duration: Duration,
        now: DateTime<Utc>,
    ) -> LastOperationState {
        let mut status = self.lock();
        let kind = current_kind(&status);

        let mut op_description = description.to_string();
        let state = if cycle_elapsed(status.retry_cycle_start_time, retry_duration, now) {
            status.retry_cycle_start_time = None;
            LastOperationState::Failed
        } else {
            op_description.push_str(" Operation will be retried.");
            LastOperationState::Error
        };

        error!(operation = %kind, ?state, "{op_description}");

        status.last_error = Some(LastError {
            description: description.to_string(),
        });

        let progress = status
            .last_operation
            .as_ref()
            .map(|op| op.progress)
            .unwrap_or(0);
        status.last_operation = Some(LastOperation {
            kind,
            state,
            progress,
            description: op_description,
            last_update_time: now,
        });

        state
    }

    /// Time left in the current retry cycle; zero once it has elapsed.
    pub fn deadline(&self, retry_duration: Duration, now: DateTime<Utc>) -> Duration {
        let Some(start) = self.lock().retry_cycle_start_time else {
            return retry_duration;
        };
        let elapsed = (now - start).to_std().unwrap_or(Duration::ZERO);
        retry_duration.saturating_sub(elapsed)
    }

    fn update_progress(&self, percent: u8, description: &str, now: DateTime<Utc>) {
        let mut status = self.lock();
        if let Some(op) = status.last_operation.as_mut() {
            op.state = LastOperationState::Processing;
            op.progress = percent.max(op.progress).min(100);
            op.description = description.to_string();
            op.last_update_time = now;
        }
    }

    fn lock(&self) -> MutexGuard<'_, OperationStatus> {
        self.status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// [`ProgressReporter`] returned by [`OperationTracker::reporter`].
#[derive(Debug, Clone)]
pub struct TrackerReporter {
    tracker: OperationTracker,
}

impl ProgressReporter for TrackerReporter {
    fn report(&mut self, percent: u8, description: &str) {
        self.tracker.update_progress(percent, description, Utc::now());
    }
}

fn current_kind(status: &OperationStatus) -> LastOperationType {
    status
        .last_operation
        .as_ref()
        .map(|op| op.kind)
        .unwrap_or_default()
}

/// A missing start time counts as elapsed.
fn cycle_elapsed(start: Option<DateTime<Utc>>, retry_duration: Duration, now: DateTime<Utc>) -> bool {
    let Some(start) = start else {
        return true;
    };
    match chrono::Duration::from_std(retry_duration) {
        Ok(d) => now > start + d,
        Err(_) => false,
    }
}
