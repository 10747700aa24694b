// src/operation/mod.rs

//! The external status record a caller keeps for one lifecycle operation.
//!
//! The flow engine never touches this; the CLI feeds it from the flow's
//! progress reporter and its final result, then persists it.

pub mod status;
pub mod store;
pub mod tracker;

pub use status::{LastError, LastOperation, LastOperationState, LastOperationType, OperationStatus};
pub use store::StatusStore;
pub use tracker::{OperationTracker, TrackerReporter};
