// src/config/mod.rs

//! Flow definition files.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a definition from disk (`loader.rs`).
//! - Validate it and fix the node registration order (`validate.rs`).
//! - Parse human-friendly durations (`duration.rs`).

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use duration::parse_duration;
pub use loader::{load_and_validate, load_from_path};
pub use model::{ConfigSection, FlowFile, NodeSpec, RawFlowFile, SyncConfig, TaskConfig};
pub use validate::validate_config;
