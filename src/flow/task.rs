// src/flow/task.rs

//! Task bodies and the errors they return.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Boxed future returned by a task body for one attempt.
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<(), TaskError>> + Send>>;

/// Type-erased task body. Invoked once per attempt.
pub type TaskFn<C> = Arc<dyn Fn(TaskContext<C>) -> TaskFuture + Send + Sync>;

/// Box a closure returning a future into a [`TaskFn`].
pub(crate) fn boxed_task<C, F, Fut>(body: F) -> TaskFn<C>
where
    C: Send + Sync + 'static,
    F: Fn(TaskContext<C>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(body(ctx)))
}

/// What a task body receives on every attempt.
///
/// `data` is whatever the caller handed to `Flow::execute`; the engine never
/// looks inside it.
pub struct TaskContext<C> {
    pub data: Arc<C>,
    /// Display name of the node being executed.
    pub task: String,
    /// 1-based attempt counter.
    pub attempt: u32,
    /// The run's cancellation signal. Bodies that poll for a long time should
    /// watch it and return early.
    pub cancel: CancellationToken,
}

impl<C> Clone for TaskContext<C> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            task: self.task.clone(),
            attempt: self.attempt,
            cancel: self.cancel.clone(),
        }
    }
}

impl<C> fmt::Debug for TaskContext<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("task", &self.task)
            .field("attempt", &self.attempt)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Error returned by a task body.
///
/// Errors are retryable by default: a node with a non-zero retry interval
/// re-invokes its body. Mark an error [`fatal`](TaskError::fatal) to fail the
/// node immediately regardless of its interval.
pub struct TaskError {
    description: Option<String>,
    cause: anyhow::Error,
    fatal: bool,
}

impl TaskError {
    pub fn retryable(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            description: None,
            cause: cause.into(),
            fatal: false,
        }
    }

    pub fn fatal(cause: impl Into<anyhow::Error>) -> Self {
        Self {
            description: None,
            cause: cause.into(),
            fatal: true,
        }
    }

    /// Attach a human-readable description that replaces the cause's message
    /// in logs and aggregated errors.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The underlying cause, with its full chain.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(cause: anyhow::Error) -> Self {
        Self::retryable(cause)
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(desc) => f.write_str(desc),
            None => write!(f, "{}", self.cause),
        }
    }
}

impl fmt::Debug for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskError")
            .field("description", &self.description)
            .field("cause", &self.cause)
            .field("fatal", &self.fatal)
            .finish()
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::error::Error as _;

    #[test]
    fn errors_are_retryable_by_default() {
        let err: TaskError = anyhow!("api server unavailable").into();
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "api server unavailable");
    }

    #[test]
    fn description_replaces_message_but_keeps_cause() {
        let err = TaskError::fatal(anyhow!("403 forbidden").context("deleting bucket"))
            .with_description("Could not destroy backup infrastructure");

        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "Could not destroy backup infrastructure");

        let source = err.source().expect("cause is exposed as source");
        assert_eq!(source.to_string(), "deleting bucket");
        assert_eq!(
            source.source().map(|s| s.to_string()).as_deref(),
            Some("403 forbidden")
        );
    }
}
