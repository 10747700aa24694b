// src/config/model.rs

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::operation::LastOperationType;

/// Flow definition exactly as read from TOML, before validation.
///
/// ```toml
/// [config]
/// name = "Shoot cluster deletion"
/// operation = "delete"
/// retry_duration = "10m"
/// default_retry = "5s"
///
/// [task.wait_for_namespace_cleanup]
/// cmd = "./scripts/wait-ns.sh"
/// after = ["delete_namespace"]
///
/// [sync.terraformers]
/// after = ["destroy_infrastructure", "destroy_dns"]
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawFlowFile {
    #[serde(default)]
    pub config: RawConfigSection,

    /// Tasks from `[task.<name>]`.
    #[serde(default)]
    pub task: BTreeMap<String, RawTaskConfig>,

    /// Sync points from `[sync.<name>]`.
    #[serde(default)]
    pub sync: BTreeMap<String, SyncConfig>,
}

/// `[config]` section as written.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigSection {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub operation: LastOperationType,

    /// Length of the retry cycle; bounds the whole run.
    #[serde(default = "default_retry_duration")]
    pub retry_duration: String,

    /// Retry interval of tasks that don't set `retry`.
    #[serde(default = "default_retry")]
    pub default_retry: String,

    #[serde(default)]
    pub max_parallel: Option<usize>,
}

fn default_name() -> String {
    "Shoot cluster operation".to_string()
}

fn default_retry_duration() -> String {
    "1h".to_string()
}

fn default_retry() -> String {
    "5s".to_string()
}

impl Default for RawConfigSection {
    fn default() -> Self {
        Self {
            name: default_name(),
            operation: LastOperationType::default(),
            retry_duration: default_retry_duration(),
            default_retry: default_retry(),
            max_parallel: None,
        }
    }
}

/// `[task.<name>]` section as written.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTaskConfig {
    /// Shell command run on every attempt.
    pub cmd: String,

    /// Optional retry interval, e.g. `"30s"`; `"0s"` disables retries.
    #[serde(default)]
    pub retry: Option<String>,

    /// `false` registers the task as skipped.
    #[serde(default = "default_condition")]
    pub condition: bool,

    /// Dependency list: this node waits for all tasks/sync points listed here.
    #[serde(default)]
    pub after: Vec<String>,
}

fn default_condition() -> bool {
    true
}

/// `[sync.<name>]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    #[serde(default)]
    pub after: Vec<String>,
}

/// Validated `[config]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSection {
    pub name: String,
    pub operation: LastOperationType,
    pub retry_duration: Duration,
    pub default_retry: Duration,
    pub max_parallel: Option<usize>,
}

/// Validated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskConfig {
    pub cmd: String,
    /// Explicit interval; `None` falls back to `default_retry`.
    pub retry: Option<Duration>,
    pub condition: bool,
    pub after: Vec<String>,
}

/// One node of a validated flow definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeSpec<'a> {
    Task(&'a str, &'a TaskConfig),
    Sync(&'a str, &'a SyncConfig),
}

impl<'a> NodeSpec<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            NodeSpec::Task(name, _) | NodeSpec::Sync(name, _) => name,
        }
    }

    pub fn after(&self) -> &'a [String] {
        match self {
            NodeSpec::Task(_, task) => &task.after,
            NodeSpec::Sync(_, sync) => &sync.after,
        }
    }
}

/// A validated flow definition.
///
/// Only constructed through `TryFrom<RawFlowFile>`, so every dependency is
/// known and `order` is a topological order of all nodes.
#[derive(Debug, Clone)]
pub struct FlowFile {
    pub config: ConfigSection,
    pub task: BTreeMap<String, TaskConfig>,
    pub sync: BTreeMap<String, SyncConfig>,
    order: Vec<String>,
}

impl FlowFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        task: BTreeMap<String, TaskConfig>,
        sync: BTreeMap<String, SyncConfig>,
        order: Vec<String>,
    ) -> Self {
        Self {
            config,
            task,
            sync,
            order,
        }
    }

    /// Nodes in registration order: every node comes after its dependencies.
    pub fn nodes(&self) -> impl Iterator<Item = NodeSpec<'_>> {
        self.order.iter().filter_map(|name| {
            if let Some(task) = self.task.get(name) {
                Some(NodeSpec::Task(name, task))
            } else {
                self.sync.get(name).map(|sync| NodeSpec::Sync(name, sync))
            }
        })
    }

    /// Retry interval a task actually runs with.
    pub fn effective_retry(&self, task: &TaskConfig) -> Duration {
        task.retry.unwrap_or(self.config.default_retry)
    }
}
