//! Command-line interface for maac-forge.
//!
//! Provides commands for scenario generation, grid inspection, trial
//! execution and validation summaries.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
