// src/flow/report.rs

//! Logger and progress-reporter collaborators.
//!
//! Both are owned by the caller and only ever invoked from the engine's
//! runtime loop, so implementations never see concurrent calls even when
//! many nodes finish at the same time.

use std::fmt;
use std::sync::Arc;

use tracing::Level;

use crate::flow::scheduler_step::Completion;
use crate::flow::state::NodeState;

/// Leveled text logger used by a flow.
pub trait FlowLogger: Send + Sync {
    fn log(&self, level: Level, message: &str);
}

/// Default logger: forwards into `tracing` with the flow name attached.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    flow: String,
}

impl TracingLogger {
    pub fn new(flow: impl Into<String>) -> Self {
        Self { flow: flow.into() }
    }
}

impl FlowLogger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        // `tracing` macros need a constant level.
        match level {
            Level::ERROR => tracing::error!(flow = %self.flow, "{message}"),
            Level::WARN => tracing::warn!(flow = %self.flow, "{message}"),
            Level::INFO => tracing::info!(flow = %self.flow, "{message}"),
            Level::DEBUG => tracing::debug!(flow = %self.flow, "{message}"),
            _ => tracing::trace!(flow = %self.flow, "{message}"),
        }
    }
}

/// Receives `(percent, description)` after every terminal node transition.
///
/// Any `FnMut(u8, &str) + Send` closure is a reporter.
pub trait ProgressReporter: Send {
    fn report(&mut self, percent: u8, description: &str);
}

impl<F> ProgressReporter for F
where
    F: FnMut(u8, &str) + Send,
{
    fn report(&mut self, percent: u8, description: &str) {
        self(percent, description)
    }
}

/// Serialized notification path from the runtime loop to the caller's
/// logger and reporter.
pub(crate) struct Notifier<'a> {
    logger: Arc<dyn FlowLogger>,
    reporter: Option<&'a mut dyn ProgressReporter>,
    last_percent: u8,
}

impl<'a> Notifier<'a> {
    pub fn new(
        logger: Arc<dyn FlowLogger>,
        reporter: Option<&'a mut dyn ProgressReporter>,
    ) -> Self {
        Self {
            logger,
            reporter,
            last_percent: 0,
        }
    }

    pub fn log(&self, level: Level, message: &str) {
        self.logger.log(level, message);
    }

    pub fn node_finished(&mut self, completion: &Completion) {
        let level = match completion.state {
            NodeState::Failed => Level::ERROR,
            NodeState::Skipped => Level::DEBUG,
            _ => Level::INFO,
        };
        self.logger.log(level, &completion.description);

        // Completed counts only grow, so this only guards against misuse.
        let percent = completion.percent.max(self.last_percent);
        self.last_percent = percent;

        if let Some(reporter) = self.reporter.as_mut() {
            reporter.report(percent, &completion.description);
        }
    }
}

impl fmt::Debug for Notifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("has_reporter", &self.reporter.is_some())
            .field("last_percent", &self.last_percent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingLogger {
        lines: Mutex<Vec<(Level, String)>>,
    }

    impl FlowLogger for RecordingLogger {
        fn log(&self, level: Level, message: &str) {
            self.lines.lock().unwrap().push((level, message.to_string()));
        }
    }

    fn completion(state: NodeState, percent: u8, description: &str) -> Completion {
        Completion {
            index: 0,
            name: "x".to_string(),
            state,
            description: description.to_string(),
            percent,
        }
    }

    #[test]
    fn notifier_logs_and_reports_each_completion() {
        let logger = Arc::new(RecordingLogger::default());
        let mut seen = Vec::new();
        let mut reporter = |p: u8, d: &str| seen.push((p, d.to_string()));

        {
            let mut notifier = Notifier::new(logger.clone(), Some(&mut reporter));
            notifier.node_finished(&completion(NodeState::Succeeded, 50, "Executed 'a'"));
            notifier.node_finished(&completion(NodeState::Failed, 99, "Failed 'b': x"));
        }

        assert_eq!(
            seen,
            vec![(50, "Executed 'a'".to_string()), (99, "Failed 'b': x".to_string())]
        );
        let lines = logger.lines.lock().unwrap();
        assert_eq!(lines[0].0, Level::INFO);
        assert_eq!(lines[1].0, Level::ERROR);
    }
}
