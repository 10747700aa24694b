// src/cli.rs

//! CLI argument parsing using `clap`.

use clap::{Parser, ValueEnum};

/// Command-line arguments for `gardenflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "gardenflow",
    version,
    about = "Run a lifecycle operation as a task-dependency graph and record its status.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the flow definition (TOML).
    ///
    /// Default: `Gardenflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Gardenflow.toml")]
    pub config: String,

    /// Path of the JSON operation status record.
    ///
    /// It is read at startup (to continue a retry cycle) and rewritten when
    /// the run finishes.
    #[arg(long, value_name = "PATH", default_value = ".gardenflow/status.json")]
    pub status_file: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `GARDENFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the flow, but don't execute any commands.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
