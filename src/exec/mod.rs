// src/exec/mod.rs

//! Node execution layer.
//!
//! This module is responsible for actually running node bodies and reporting
//! back to the engine runtime via `NodeEvent`s.
//!
//! - [`backend`] provides the `ExecutorBackend` trait and the concrete
//!   `TokioExecutor` used by `Flow::execute`, which tests can replace with a
//!   fake implementation.
//! - [`task_runner`] drives a single node through its attempts.
//! - [`retry`] holds the per-node retry policy.
//! - [`command`] provides shell-command task bodies used by the CLI.

pub mod backend;
pub mod command;
pub mod retry;
pub mod task_runner;

pub use backend::{ExecutorBackend, TokioExecutor};
pub use command::CommandTask;
pub use retry::RetryPolicy;
