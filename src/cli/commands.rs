//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::reconciler::DeployOptions;

/// Catalog reconcile - Declarative schema catalog manager.
#[derive(Parser, Debug)]
#[command(name = "catalog-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true, env = "CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the catalog configuration.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show the changes a deploy would make.
    Plan,

    /// Converge the catalog on the configuration.
    Deploy {
        /// Run mode flags.
        #[command(flatten)]
        mode: ModeArgs,
    },

    /// Delete every managed object the retention policy allows.
    Remove {
        /// Run mode flags.
        #[command(flatten)]
        mode: ModeArgs,

        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Flags selecting a read-only run.
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct ModeArgs {
    /// Report changes without submitting them.
    #[arg(long)]
    pub preview: bool,

    /// Like --preview, and also print the statements that would run.
    #[arg(long)]
    pub dry_run: bool,
}

impl From<ModeArgs> for DeployOptions {
    fn from(args: ModeArgs) -> Self {
        Self {
            preview: args.preview,
            dry_run: args.dry_run,
        }
    }
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
