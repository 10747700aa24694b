// src/operation/store.rs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::operation::status::OperationStatus;

/// Loads and saves an [`OperationStatus`] as pretty-printed JSON.
#[derive(Debug, Clone)]
pub struct StatusStore {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

impl StatusStore {
    pub fn new(fs: Arc<dyn FileSystem>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file yields an empty record.
    pub fn load(&self) -> Result<OperationStatus> {
        if !self.fs.exists(&self.path) {
            debug!(path = ?self.path, "no status file yet; starting fresh");
            return Ok(OperationStatus::default());
        }
        let contents = self.fs.read_to_string(&self.path)?;
        let status = serde_json::from_str(&contents)?;
        Ok(status)
    }

    pub fn save(&self, status: &OperationStatus) -> Result<()> {
        let json = serde_json::to_vec_pretty(status)?;
        self.fs.write(&self.path, &json)?;
        debug!(path = ?self.path, "status saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MockFileSystem;
    use crate::operation::status::{LastError, OperationStatus};

    #[test]
    fn missing_file_loads_default_and_save_round_trips() {
        let fs = MockFileSystem::new();
        let store = StatusStore::new(Arc::new(fs.clone()), "status.json");

        assert_eq!(store.load().unwrap(), OperationStatus::default());

        let status = OperationStatus {
            last_error: Some(LastError {
                description: "boom".to_string(),
            }),
            ..OperationStatus::default()
        };
        store.save(&status).unwrap();

        assert_eq!(store.path(), Path::new("status.json"));
        assert!(fs.contents("status.json").is_some());
        assert_eq!(store.load().unwrap(), status);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let fs = MockFileSystem::new();
        fs.add_file("status.json", "not json");
        let store = StatusStore::new(Arc::new(fs), "status.json");
        assert!(store.load().is_err());
    }
}
