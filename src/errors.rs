// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::flow::BuildError;

#[derive(Error, Debug)]
pub enum GardenflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in flow definition: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Flow construction error: {0}")]
    BuildError(#[from] BuildError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, GardenflowError>;
