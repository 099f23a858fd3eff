//! CLI module for the PingOne reconciler.
//!
//! This module provides the command-line interface for validating,
//! planning and applying configuration documents.

mod commands;
mod output;

pub use commands::{Cli, Commands, LogFormat, OutputFormat};
pub use output::OutputFormatter;
