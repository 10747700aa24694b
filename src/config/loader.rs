// src/config/loader.rs

use std::fs;
use std::path::Path;

use crate::config::model::{FlowFile, RawFlowFile};
use crate::errors::Result;

/// Load a flow definition from a given path and return the raw `RawFlowFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawFlowFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawFlowFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a flow definition from path and validate it.
///
/// - Reads TOML.
/// - Applies defaults (handled by `serde` + `Default` impls).
/// - Parses durations and checks unknown or self-referencing `after`
///   entries, duplicate names and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<FlowFile> {
    let raw_config = load_from_path(&path)?;
    let config = FlowFile::try_from(raw_config)?;
    Ok(config)
}
