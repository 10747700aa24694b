// src/flow/scheduler_step.rs

//! Step-by-step execution result types for the scheduler.

use crate::flow::state::NodeState;

/// A node that reached a terminal state during a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub index: usize,
    pub name: String,
    pub state: NodeState,
    /// Human-readable status line, handed to the progress reporter.
    pub description: String,
    /// Progress percentage right after this transition.
    pub percent: u8,
}

/// Structured result of a single scheduler "step".
///
/// This is useful for tests that want to manually step the graph and make
/// assertions about what changed.
#[derive(Debug, Clone, Default)]
pub struct SchedulerStep {
    /// Nodes whose bodies should be dispatched now, in graph order.
    pub newly_scheduled: Vec<usize>,
    /// Terminal transitions, in the order they happened.
    pub completions: Vec<Completion>,
    /// Whether the run has nothing left in flight after this step.
    pub run_finished: bool,
}
