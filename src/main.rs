//! Catalog reconcile CLI entrypoint.
//!
//! This is the main entrypoint for the catalog-reconcile command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use catalog_reconcile::cli::{Cli, Commands, ConsoleLogger, OutputFormat, OutputFormatter};
use catalog_reconcile::config::{CatalogConfig, ConfigParser, ConfigValidator, find_config_file};
use catalog_reconcile::catalog::HttpCatalogClient;
use catalog_reconcile::error::Result;
use catalog_reconcile::reconciler::{DeployOptions, Reconciler};
use catalog_reconcile::report::Report;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Validate { warnings } => {
            cmd_validate(cli.config.as_ref(), warnings, &formatter)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan => {
            let options = DeployOptions {
                preview: true,
                dry_run: false,
            };
            cmd_deploy(cli.config.as_ref(), options, &formatter).await
        }
        Commands::Deploy { mode } => cmd_deploy(cli.config.as_ref(), mode.into(), &formatter).await,
        Commands::Remove { mode, yes } => {
            cmd_remove(cli.config.as_ref(), mode.into(), yes, &formatter).await
        }
    }
}

/// Validate configuration.
fn cmd_validate(
    config_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;
    let (generation, section) = config.active_section()?;

    emit(formatter, &formatter.format_validation(generation, section, &result, show_warnings))
}

/// Deploy, preview or dry-run.
async fn cmd_deploy(
    config_path: Option<&PathBuf>,
    options: DeployOptions,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let client = create_client(&config)?;
    let logger = ConsoleLogger;

    let outcome = Reconciler::new(&config, &client, &logger).deploy(options).await;
    finish(outcome, formatter)
}

/// Remove every managed object the retention policy allows.
async fn cmd_remove(
    config_path: Option<&PathBuf>,
    options: DeployOptions,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let config = load_config(config_path)?;
    let client = create_client(&config)?;
    let logger = ConsoleLogger;
    let reconciler = Reconciler::new(&config, &client, &logger);

    if !auto_approve && !options.mode().is_read_only() {
        let preview = DeployOptions {
            preview: true,
            dry_run: false,
        };
        let Ok(planned) = reconciler.remove(preview).await else {
            return Ok(ExitCode::FAILURE);
        };
        if planned.is_empty() {
            return Ok(ExitCode::SUCCESS);
        }

        eprint!("\nThis action is IRREVERSIBLE. Type 'remove' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "remove" {
            eprintln!("Removal cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let outcome = reconciler.remove(options).await;
    finish(outcome, formatter)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Prints the report of a finished run.
///
/// Failures were already reported through the logger.
fn finish(outcome: Result<Report>, formatter: &OutputFormatter) -> Result<ExitCode> {
    match outcome {
        Ok(report) => {
            emit(formatter, &formatter.format_report(&report))?;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            debug!("Run failed: {e:?}");
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Writes formatted output: JSON to stdout, text to stderr.
fn emit(formatter: &OutputFormatter, output: &str) -> Result<()> {
    match formatter.format() {
        OutputFormat::Json => writeln!(std::io::stdout(), "{output}")?,
        OutputFormat::Text => writeln!(std::io::stderr(), "{output}")?,
    }
    Ok(())
}

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

fn base_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

/// Loads and validates configuration.
fn load_config(config_path: Option<&PathBuf>) -> Result<CatalogConfig> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(base_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    let result = ConfigValidator::new().validate(&config)?;
    for warning in &result.warnings {
        tracing::warn!("{warning}");
    }

    Ok(config)
}

/// Creates the catalog client from the configured connection.
fn create_client(config: &CatalogConfig) -> Result<HttpCatalogClient> {
    let secret = ConfigParser::get_secret(&config.connection)?;
    let client = HttpCatalogClient::new(&config.connection, &secret)?;
    debug!("Using catalog at {}", client.endpoint());
    Ok(client)
}
