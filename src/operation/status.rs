// src/operation/status.rs

//! Serializable status record maintained from flow progress callbacks.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of lifecycle operation a flow performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LastOperationType {
    #[serde(alias = "create")]
    Create,
    #[serde(alias = "reconcile")]
    Reconcile,
    #[serde(alias = "delete")]
    Delete,
}

impl LastOperationType {
    /// Infinitive, as in "Failed to delete Shoot cluster".
    pub fn verb(self) -> &'static str {
        match self {
            LastOperationType::Create => "create",
            LastOperationType::Reconcile => "reconcile",
            LastOperationType::Delete => "delete",
        }
    }

    /// Noun, as in "Deletion of Shoot cluster in progress."
    pub fn noun(self) -> &'static str {
        match self {
            LastOperationType::Create => "Creation",
            LastOperationType::Reconcile => "Reconciliation",
            LastOperationType::Delete => "Deletion",
        }
    }

    /// Past participle, as in "has been successfully deleted."
    pub fn past(self) -> &'static str {
        match self {
            LastOperationType::Create => "created",
            LastOperationType::Reconcile => "reconciled",
            LastOperationType::Delete => "deleted",
        }
    }
}

impl Default for LastOperationType {
    fn default() -> Self {
        LastOperationType::Reconcile
    }
}

impl fmt::Display for LastOperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LastOperationType::Create => "Create",
            LastOperationType::Reconcile => "Reconcile",
            LastOperationType::Delete => "Delete",
        };
        f.write_str(s)
    }
}

impl FromStr for LastOperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "create" => Ok(LastOperationType::Create),
            "reconcile" => Ok(LastOperationType::Reconcile),
            "delete" => Ok(LastOperationType::Delete),
            other => Err(format!(
                "invalid operation: {other} (expected \"create\", \"reconcile\" or \"delete\")"
            )),
        }
    }
}

/// Where the last operation stands.
///
/// `Error` means the operation failed but will be retried; `Failed` means
/// the retry cycle is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LastOperationState {
    Processing,
    Succeeded,
    Failed,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastOperation {
    #[serde(rename = "type")]
    pub kind: LastOperationType,
    pub state: LastOperationState,
    /// 0 to 100.
    pub progress: u8,
    pub description: String,
    pub last_update_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastError {
    pub description: String,
}

/// The whole persisted record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_operation: Option<LastOperation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<LastError>,
    /// Start of the current retry cycle; cleared on success or when the
    /// cycle is exhausted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_cycle_start_time: Option<DateTime<Utc>>,
}
