// src/exec/retry.rs

//! Retry-until-stopped policy for a single node.
//!
//! A zero interval means exactly one attempt. A non-zero interval re-invokes
//! the body after sleeping for the interval, until it succeeds, returns a
//! fatal error, or the run's cancellation signal fires. There is no attempt
//! ceiling here; callers bound total retry time through the signal.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::flow::errors::{CancellationError, NodeError};
use crate::flow::task::TaskError;

/// Retry behaviour of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
}

/// What to do after a failed attempt.
#[derive(Debug)]
pub enum RetryDecision {
    /// Sleep for `after` and try again. `last_error` becomes the cause if the
    /// sleep is cut short.
    RetryAfter {
        after: Duration,
        last_error: TaskError,
    },
    /// Give up; the node fails with this error.
    GiveUp(NodeError),
}

impl RetryPolicy {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn retries(&self) -> bool {
        !self.interval.is_zero()
    }

    /// Classify a failed attempt.
    pub fn decide(&self, err: TaskError, cancel: &CancellationToken) -> RetryDecision {
        if err.is_fatal() || !self.retries() {
            return RetryDecision::GiveUp(NodeError::Task(err));
        }
        if cancel.is_cancelled() {
            return RetryDecision::GiveUp(NodeError::Cancelled(CancellationError {
                last_error: Some(err),
            }));
        }
        RetryDecision::RetryAfter {
            after: self.interval,
            last_error: err,
        }
    }

    /// Sleep for the interval unless the cancellation signal fires first.
    ///
    /// Returns `false` if the sleep was interrupted by cancellation.
    pub async fn wait(&self, cancel: &CancellationToken) -> bool {
        trace!(interval = ?self.interval, "sleeping before next attempt");
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => true,
            _ = cancel.cancelled() => {
                debug!("cancellation fired while waiting to retry");
                false
            }
        }
    }
}
