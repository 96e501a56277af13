//! CLI module for the catalog reconciler.
//!
//! This module provides the command-line interface for validating,
//! planning, deploying and removing managed catalog schemas.

mod commands;
mod output;

pub use commands::{Cli, Commands, ModeArgs, OutputFormat};
pub use output::{ConsoleLogger, OutputFormatter};
