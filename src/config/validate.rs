// src/config/validate.rs

use std::collections::BTreeMap;
use std::time::Duration;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::duration::parse_duration;
use crate::config::model::{ConfigSection, FlowFile, RawFlowFile, TaskConfig};
use crate::errors::{GardenflowError, Result};

impl TryFrom<RawFlowFile> for FlowFile {
    type Error = GardenflowError;

    fn try_from(raw: RawFlowFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_tasks(&raw)?;
        ensure_unique_names(&raw)?;
        let config = validate_global_config(&raw)?;
        let task = validate_tasks(&raw)?;
        validate_dependencies(&raw)?;
        let order = registration_order(&raw)?;
        Ok(FlowFile::new_unchecked(config, task, raw.sync, order))
    }
}

/// Validate an already-deserialized definition.
pub fn validate_config(raw: RawFlowFile) -> Result<FlowFile> {
    FlowFile::try_from(raw)
}

fn ensure_has_tasks(cfg: &RawFlowFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(GardenflowError::ConfigError(
            "flow definition must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn ensure_unique_names(cfg: &RawFlowFile) -> Result<()> {
    if let Some(name) = cfg.sync.keys().find(|name| cfg.task.contains_key(*name)) {
        return Err(GardenflowError::ConfigError(format!(
            "'{name}' is defined both as [task.{name}] and [sync.{name}]"
        )));
    }
    Ok(())
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value)
        .map_err(|e| GardenflowError::ConfigError(format!("{field}: {e}")))
}

fn validate_global_config(cfg: &RawFlowFile) -> Result<ConfigSection> {
    let raw = &cfg.config;

    if raw.name.trim().is_empty() {
        return Err(GardenflowError::ConfigError(
            "[config].name must not be empty".to_string(),
        ));
    }

    let retry_duration = duration_field("[config].retry_duration", &raw.retry_duration)?;
    if retry_duration.is_zero() {
        return Err(GardenflowError::ConfigError(
            "[config].retry_duration must be greater than zero".to_string(),
        ));
    }

    let default_retry = duration_field("[config].default_retry", &raw.default_retry)?;

    if raw.max_parallel == Some(0) {
        return Err(GardenflowError::ConfigError(
            "[config].max_parallel must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(ConfigSection {
        name: raw.name.clone(),
        operation: raw.operation,
        retry_duration,
        default_retry,
        max_parallel: raw.max_parallel,
    })
}

fn validate_tasks(cfg: &RawFlowFile) -> Result<BTreeMap<String, TaskConfig>> {
    let mut tasks = BTreeMap::new();
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(GardenflowError::ConfigError(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }
        let retry = task
            .retry
            .as_deref()
            .map(|r| duration_field(&format!("[task.{name}].retry"), r))
            .transpose()?;

        tasks.insert(
            name.clone(),
            TaskConfig {
                cmd: task.cmd.clone(),
                retry,
                condition: task.condition,
                after: task.after.clone(),
            },
        );
    }
    Ok(tasks)
}

/// Every `(node, after)` pair of the definition.
fn edges(cfg: &RawFlowFile) -> impl Iterator<Item = (&str, &[String])> {
    let tasks = cfg.task.iter().map(|(n, t)| (n.as_str(), t.after.as_slice()));
    let syncs = cfg.sync.iter().map(|(n, s)| (n.as_str(), s.after.as_slice()));
    tasks.chain(syncs)
}

fn validate_dependencies(cfg: &RawFlowFile) -> Result<()> {
    for (name, after) in edges(cfg) {
        for dep in after {
            if dep == name {
                return Err(GardenflowError::ConfigError(format!(
                    "'{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) && !cfg.sync.contains_key(dep) {
                return Err(GardenflowError::ConfigError(format!(
                    "'{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

/// Topological order of all nodes; fails on cycles.
fn registration_order(cfg: &RawFlowFile) -> Result<Vec<String>> {
    // Edge direction: dep -> node
    // For:
    //   [task.B]
    //   after = ["A"]
    // we add edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (name, _) in edges(cfg) {
        graph.add_node(name);
    }
    for (name, after) in edges(cfg) {
        for dep in after {
            graph.add_edge(dep.as_str(), name, ());
        }
    }

    match toposort(&graph, None) {
        Ok(order) => Ok(order.into_iter().map(str::to_string).collect()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(GardenflowError::DagCycle(format!(
                "cycle detected in flow definition involving '{}'",
                node
            )))
        }
    }
}
