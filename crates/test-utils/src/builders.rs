use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gardenflow::config::model::{RawConfigSection, RawTaskConfig};
use gardenflow::config::{FlowFile, RawFlowFile, SyncConfig};
use gardenflow::operation::LastOperationType;

/// Builder for `FlowFile` to simplify test setup.
pub struct FlowFileBuilder {
    raw: RawFlowFile,
}

impl FlowFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            raw: RawFlowFile {
                config: RawConfigSection {
                    name: name.to_string(),
                    ..RawConfigSection::default()
                },
                task: BTreeMap::new(),
                sync: BTreeMap::new(),
            },
        }
    }

    pub fn operation(mut self, op: LastOperationType) -> Self {
        self.raw.config.operation = op;
        self
    }

    pub fn retry_duration(mut self, d: &str) -> Self {
        self.raw.config.retry_duration = d.to_string();
        self
    }

    pub fn default_retry(mut self, d: &str) -> Self {
        self.raw.config.default_retry = d.to_string();
        self
    }

    pub fn max_parallel(mut self, n: usize) -> Self {
        self.raw.config.max_parallel = Some(n);
        self
    }

    pub fn with_task(mut self, name: &str, task: TaskConfigBuilder) -> Self {
        self.raw.task.insert(name.to_string(), task.build());
        self
    }

    pub fn with_sync(mut self, name: &str, after: &[&str]) -> Self {
        self.raw.sync.insert(
            name.to_string(),
            SyncConfig {
                after: after.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    pub fn raw(self) -> RawFlowFile {
        self.raw
    }

    pub fn build(self) -> FlowFile {
        FlowFile::try_from(self.raw).expect("Failed to build valid flow file from builder")
    }
}

/// Builder for `[task.<name>]` entries.
pub struct TaskConfigBuilder {
    task: RawTaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: RawTaskConfig {
                cmd: cmd.to_string(),
                retry: None,
                condition: true,
                after: Vec::new(),
            },
        }
    }

    pub fn after(mut self, deps: &[&str]) -> Self {
        self.task.after = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn retry(mut self, d: &str) -> Self {
        self.task.retry = Some(d.to_string());
        self
    }

    pub fn condition(mut self, condition: bool) -> Self {
        self.task.condition = condition;
        self
    }

    pub fn build(self) -> RawTaskConfig {
        self.task
    }
}

/// Write `contents` as `Gardenflow.toml` inside `dir` and return its path.
pub fn write_flow_file(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("Gardenflow.toml");
    std::fs::write(&path, contents).expect("writing flow file");
    path
}
