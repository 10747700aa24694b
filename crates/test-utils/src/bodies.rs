//! Task bodies that record how they were invoked.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use gardenflow::flow::{TaskContext, TaskError, TaskFuture};
use tokio::time::Instant;

/// What a recorded body does on each attempt.
#[derive(Debug, Clone, Copy)]
pub enum Behaviour {
    Succeed,
    /// Fail (retryably) on the first `n` attempts, then succeed.
    FailTimes(u32),
    /// Fail retryably on every attempt.
    AlwaysFail,
    /// Fail with a fatal error.
    Fatal,
    /// Sleep, then succeed.
    Sleep(Duration),
}

#[derive(Debug, Default)]
struct State {
    starts: HashMap<String, Vec<Instant>>,
    in_flight: HashMap<String, u32>,
    running: usize,
    max_running: usize,
    overlapping: bool,
    finish_order: Vec<String>,
}

/// Shared log of body invocations across all nodes of a test flow.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    state: Arc<Mutex<State>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A body named `name` with the given behaviour.
    pub fn body<C>(
        &self,
        name: &str,
        behaviour: Behaviour,
    ) -> impl Fn(TaskContext<C>) -> TaskFuture + Send + Sync + use<C>
    where
        C: Send + Sync + 'static,
    {
        let recorder = self.clone();
        let name = name.to_string();
        move |_ctx: TaskContext<C>| {
            let recorder = recorder.clone();
            let name = name.clone();
            let fut: TaskFuture = Box::pin(async move {
                let attempt = recorder.enter(&name);
                let result = match behaviour {
                    Behaviour::Succeed => Ok(()),
                    Behaviour::FailTimes(n) if attempt <= n => {
                        Err(TaskError::retryable(anyhow!("{name} attempt {attempt} failed")))
                    }
                    Behaviour::FailTimes(_) => Ok(()),
                    Behaviour::AlwaysFail => {
                        Err(TaskError::retryable(anyhow!("{name} always fails")))
                    }
                    Behaviour::Fatal => Err(TaskError::fatal(anyhow!("{name} failed fatally"))),
                    Behaviour::Sleep(d) => {
                        tokio::time::sleep(d).await;
                        Ok(())
                    }
                };
                recorder.exit(&name);
                result
            });
            fut
        }
    }

    fn enter(&self, name: &str) -> u32 {
        let mut guard = self.state.lock().unwrap();
        let s = &mut *guard;
        s.starts.entry(name.to_string()).or_default().push(Instant::now());
        let in_flight = s.in_flight.entry(name.to_string()).or_default();
        *in_flight += 1;
        if *in_flight > 1 {
            s.overlapping = true;
        }
        s.running += 1;
        s.max_running = s.max_running.max(s.running);
        s.starts[name].len() as u32
    }

    fn exit(&self, name: &str) {
        let mut s = self.state.lock().unwrap();
        if let Some(n) = s.in_flight.get_mut(name) {
            *n -= 1;
        }
        s.running -= 1;
        s.finish_order.push(name.to_string());
    }

    /// Number of times `name`'s body was invoked.
    pub fn calls(&self, name: &str) -> usize {
        self.starts(name).len()
    }

    /// Start instants of every invocation of `name`.
    pub fn starts(&self, name: &str) -> Vec<Instant> {
        self.state
            .lock()
            .unwrap()
            .starts
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    /// Names in the order their attempts returned.
    pub fn finish_order(&self) -> Vec<String> {
        self.state.lock().unwrap().finish_order.clone()
    }

    /// Whether any node ever had two invocations in flight at once.
    pub fn saw_overlap(&self) -> bool {
        self.state.lock().unwrap().overlapping
    }

    /// Highest number of bodies running at the same time.
    pub fn max_running(&self) -> usize {
        self.state.lock().unwrap().max_running
    }
}
