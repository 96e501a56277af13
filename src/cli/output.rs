//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying
//! information to the user in various formats.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::catalog::OutcomeAction;
use crate::config::{SchemaSection, ValidationResult};
use crate::report::{Logger, Report, ReportEntry};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Report entry row for table display.
#[derive(Tabled)]
struct EntryRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Changed fields")]
    fields: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Returns the selected format.
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Formats a run report for display.
    #[must_use]
    pub fn format_report(&self, report: &Report) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_default(),
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats a report as text.
    fn format_report_text(report: &Report) -> String {
        let mut output = String::new();
        let _ = writeln!(
            output,
            "\nCatalog {} ({} run, fingerprint {})",
            report.generation,
            report.mode,
            report.fingerprint
        );

        if report.is_empty() {
            let _ = writeln!(output, "{} No changes - catalog is up to date.", "✓".green());
            return output;
        }

        let rows: Vec<EntryRow> = report
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| EntryRow {
                index: i + 1,
                action: Self::format_action(entry.action),
                kind: entry.kind.to_string(),
                name: entry.name.clone(),
                fields: Self::truncate(&Self::changed_fields(entry), 40),
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        let _ = write!(
            output,
            "\nSummary: {} created, {} updated, {} deleted\n",
            report.count(OutcomeAction::Created).to_string().green(),
            report.count(OutcomeAction::Updated).to_string().yellow(),
            report.count(OutcomeAction::Deleted).to_string().red()
        );
        output
    }

    /// Formats a validation result for display.
    #[must_use]
    pub fn format_validation(
        &self,
        generation: impl std::fmt::Display,
        section: &SchemaSection,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::json!({
                    "valid": result.is_valid(),
                    "generation": generation.to_string(),
                    "collections": section.collections.len(),
                    "indexes": section.indexes.len(),
                    "functions": section.functions.len(),
                    "roles": section.roles.len(),
                    "warnings": result.warnings,
                });
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => {
                let mut output = format!("{} Configuration is valid!\n", "✓".green());
                if show_warnings && !result.warnings.is_empty() {
                    output.push_str("\nWarnings:\n");
                    for warning in &result.warnings {
                        let _ = writeln!(output, "  {} {warning}", "⚠".yellow());
                    }
                }
                let _ = write!(
                    output,
                    "\nConfiguration summary:\n  Generation: {generation}\n  Collections: {}\n  Indexes: {}\n  Functions: {}\n  Roles: {}\n",
                    section.collections.len(),
                    section.indexes.len(),
                    section.functions.len(),
                    section.roles.len()
                );
                output
            }
        }
    }

    /// Formats an outcome action with color.
    fn format_action(action: OutcomeAction) -> String {
        match action {
            OutcomeAction::Created => "+created".green().to_string(),
            OutcomeAction::Updated => "~updated".yellow().to_string(),
            OutcomeAction::Deleted => "-deleted".red().to_string(),
            OutcomeAction::NoOp => "no-op".dimmed().to_string(),
        }
    }

    fn changed_fields(entry: &ReportEntry) -> String {
        entry
            .field_diffs
            .iter()
            .map(|d| d.field.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

/// Logger writing coloured lines to stderr.
#[derive(Debug, Default)]
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn info(&self, message: &str) {
        eprintln!("{message}");
    }

    fn success(&self, message: &str) {
        eprintln!("{} {message}", "✓".green());
    }

    fn error(&self, message: &str) {
        eprintln!("{} {message}", "✗".red());
    }
}
