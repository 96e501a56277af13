//! Run reports and the logging capability.
//!
//! A [`Report`] lists every object a run changed (or would change, in preview
//! and dry-run modes). Unchanged objects are never reported. Reports are
//! emitted line by line through a [`Logger`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use crate::catalog::{ObjectKind, OutcomeAction};
use crate::config::Generation;

/// Line-oriented logging capability handed to the reconciler.
pub trait Logger: Send + Sync {
    /// Logs an informational line.
    fn info(&self, message: &str);
    /// Logs a success line.
    fn success(&self, message: &str);
    /// Logs an error line.
    fn error(&self, message: &str);
}

/// Logger forwarding every line to `tracing`.
#[derive(Debug, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn info(&self, message: &str) {
        tracing::info!("{message}");
    }

    fn success(&self, message: &str) {
        tracing::info!(outcome = "success", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!("{message}");
    }
}

/// How a run treats the remote catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Changes are submitted.
    Apply,
    /// Changes are computed and listed, never submitted.
    Preview,
    /// Like preview, and the rendered statements are listed too.
    DryRun,
}

impl RunMode {
    /// Returns the prefix put in front of every log line, if any.
    #[must_use]
    pub const fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Apply => None,
            Self::Preview => Some("[preview]"),
            Self::DryRun => Some("[dry-run]"),
        }
    }

    /// Returns true if the remote catalog is never mutated.
    #[must_use]
    pub const fn is_read_only(self) -> bool {
        !matches!(self, Self::Apply)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Apply => "apply",
            Self::Preview => "preview",
            Self::DryRun => "dry-run",
        };
        write!(f, "{s}")
    }
}

/// A single differing field, as a before/after pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    /// Attribute name.
    pub field: String,
    /// Stored value; `None` when the field is absent.
    pub before: Option<Value>,
    /// Desired value; `None` when the field is removed.
    pub after: Option<Value>,
}

impl fmt::Display for FieldDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<Value>| v.as_ref().map_or_else(|| String::from("(absent)"), Value::to_string);
        write!(f, "{}: {} -> {}", self.field, show(&self.before), show(&self.after))
    }
}

/// One changed object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    /// Object kind.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Object name.
    pub name: String,
    /// What happened (or would happen) to the object.
    pub action: OutcomeAction,
    /// Differing fields, for updates.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_diffs: Vec<FieldDiff>,
}

impl fmt::Display for ReportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} '{}'", self.action, self.kind, self.name)
    }
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    /// Unique identifier of the run.
    pub run_id: Uuid,
    /// When the report was produced.
    pub generated_at: DateTime<Utc>,
    /// Protocol generation the run used.
    pub generation: Generation,
    /// Run mode.
    pub mode: RunMode,
    /// Content hash of the desired set.
    pub fingerprint: String,
    /// Changed objects, in plan order.
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// Creates an empty report.
    #[must_use]
    pub fn new(generation: Generation, mode: RunMode, fingerprint: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            generation,
            mode,
            fingerprint: fingerprint.into(),
            entries: Vec::new(),
        }
    }

    /// Returns true if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Counts entries with the given action.
    #[must_use]
    pub fn count(&self, action: OutcomeAction) -> usize {
        self.entries.iter().filter(|e| e.action == action).count()
    }

    /// Emits the report through a logger, one line per entry and field.
    pub fn log_to(&self, logger: &dyn Logger) {
        let line = |text: String| match self.mode.prefix() {
            Some(prefix) => format!("{prefix} {text}"),
            None => text,
        };

        if self.entries.is_empty() {
            logger.success(&line(String::from("Catalog is up to date")));
            return;
        }

        for entry in &self.entries {
            logger.success(&line(entry.to_string()));
            for diff in &entry.field_diffs {
                logger.info(&line(format!("  ~ {diff}")));
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Logger;
    use std::sync::Mutex;

    /// Logger keeping every line for assertions.
    #[derive(Debug, Default)]
    pub struct RecordingLogger {
        lines: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingLogger {
        pub fn lines(&self) -> Vec<(&'static str, String)> {
            self.lines.lock().unwrap().clone()
        }

        pub fn messages(&self) -> Vec<String> {
            self.lines().into_iter().map(|(_, m)| m).collect()
        }

        pub fn errors(&self) -> Vec<String> {
            self.lines()
                .into_iter()
                .filter(|(level, _)| *level == "error")
                .map(|(_, m)| m)
                .collect()
        }
    }

    impl Logger for RecordingLogger {
        fn info(&self, message: &str) {
            self.lines.lock().unwrap().push(("info", message.to_string()));
        }

        fn success(&self, message: &str) {
            self.lines.lock().unwrap().push(("success", message.to_string()));
        }

        fn error(&self, message: &str) {
            self.lines.lock().unwrap().push(("error", message.to_string()));
        }
    }
}
