//! Legacy-generation backend.
//!
//! Plans are submitted step by step. Updates are deep merges, so keys that
//! disappeared from configuration are explicitly nulled. Function bodies,
//! roles, index sources, resources and predicates are query snippets.

use serde_json::{Map, Value};

use crate::catalog::{DesiredObject, ObjectKind};
use crate::config::Generation;
use crate::error::{PlanError, Result};
use crate::planner::{Operation, OperationKind};
use crate::query::{Expr, Statement, Verb, parse_snippet};

use super::{Backend, ExecutionMode, object_expr};

/// Backend for the `catalog_v1:` section.
#[derive(Debug, Default)]
pub struct LegacyBackend;

impl LegacyBackend {
    /// Creates a new backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// What a snippet slot turns into.
#[derive(Clone, Copy)]
enum SlotForm {
    /// Canonical source text, still a snippet.
    Source,
    /// The parsed expression.
    Parsed,
}

/// Context for snippet errors.
struct Site<'a> {
    kind: ObjectKind,
    name: &'a str,
    form: SlotForm,
}

impl<'a> Site<'a> {
    const fn new(kind: ObjectKind, name: &'a str, form: SlotForm) -> Self {
        Self { kind, name, form }
    }

    fn snippet(&self, field: &str, value: &Value) -> Result<Expr> {
        let Value::String(text) = value else {
            return Ok(Expr::from(value));
        };
        let parsed = parse_snippet(text).map_err(|source| PlanError::InvalidSnippet {
            kind: self.kind.to_string(),
            name: self.name.to_string(),
            field: field.to_string(),
            source,
        })?;
        Ok(match self.form {
            SlotForm::Source => Expr::String(parsed.to_string()),
            SlotForm::Parsed => parsed,
        })
    }

    /// Converts every attribute of `object`.
    fn attributes(&self, object: &DesiredObject) -> Result<Map<String, Value>> {
        let mut attributes = Map::new();
        for (key, value) in &object.attributes {
            attributes.insert(key.clone(), self.field(object.kind, key, value)?.to_json());
        }
        Ok(attributes)
    }

    /// Converts one top-level field, parsing the snippet slots it holds.
    fn field(&self, kind: ObjectKind, key: &str, value: &Value) -> Result<Expr> {
        match (kind, key) {
            (ObjectKind::Function, "body" | "role") | (ObjectKind::Index, "source") => {
                self.snippet(key, value)
            }
            (ObjectKind::Role, "privileges" | "membership") => {
                let Value::Array(entries) = value else {
                    return Ok(Expr::from(value));
                };
                let mut items = Vec::with_capacity(entries.len());
                for (i, entry) in entries.iter().enumerate() {
                    items.push(self.entry(&format!("{key}[{i}]"), entry)?);
                }
                Ok(Expr::Array(items))
            }
            _ => Ok(Expr::from(value)),
        }
    }

    /// Converts a privilege or membership entry.
    fn entry(&self, path: &str, entry: &Value) -> Result<Expr> {
        let Value::Object(fields) = entry else {
            return Ok(Expr::from(entry));
        };
        let mut out = std::collections::BTreeMap::new();
        for (key, value) in fields {
            let expr = match (key.as_str(), value) {
                ("resource" | "predicate", _) => self.snippet(&format!("{path}.{key}"), value)?,
                ("actions", Value::Object(actions)) => {
                    let mut converted = std::collections::BTreeMap::new();
                    for (action, rule) in actions {
                        converted.insert(
                            action.clone(),
                            self.snippet(&format!("{path}.actions.{action}"), rule)?,
                        );
                    }
                    Expr::Object(converted)
                }
                _ => Expr::from(value),
            };
            out.insert(key.clone(), expr);
        }
        Ok(Expr::Object(out))
    }
}

/// Builds a merge patch that nulls every key of `previous` missing from `desired`.
///
/// Declared fields are nulled at the top level; `data` is walked recursively.
fn removal_patch(kind: ObjectKind, previous: &Map<String, Value>, desired: &Map<String, Value>) -> Map<String, Value> {
    let mut patch = desired.clone();
    for field in kind.declared_fields() {
        if previous.contains_key(*field) && !desired.contains_key(*field) {
            patch.insert((*field).to_string(), Value::Null);
        }
    }
    if let (Some(Value::Object(old)), Some(Value::Object(new))) = (previous.get("data"), desired.get("data")) {
        patch.insert(String::from("data"), Value::Object(null_removed(old, new)));
    }
    patch
}

fn null_removed(old: &Map<String, Value>, new: &Map<String, Value>) -> Map<String, Value> {
    let mut out = new.clone();
    for (key, old_value) in old {
        match (old_value, new.get(key)) {
            (_, None) => {
                out.insert(key.clone(), Value::Null);
            }
            (Value::Object(old_inner), Some(Value::Object(new_inner))) => {
                out.insert(key.clone(), Value::Object(null_removed(old_inner, new_inner)));
            }
            _ => {}
        }
    }
    out
}

impl Backend for LegacyBackend {
    fn generation(&self) -> Generation {
        Generation::Legacy
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Stepwise
    }

    fn normalize(&self, object: DesiredObject) -> Result<DesiredObject> {
        let attributes = Site::new(object.kind, &object.name, SlotForm::Source).attributes(&object)?;
        Ok(DesiredObject { attributes, ..object })
    }

    fn stored_form(&self, object: &DesiredObject) -> Result<Map<String, Value>> {
        Site::new(object.kind, &object.name, SlotForm::Parsed).attributes(object)
    }

    fn render(&self, operation: &Operation) -> Result<Statement> {
        let site = Site::new(operation.object_kind, &operation.name, SlotForm::Parsed);
        let field = |kind: ObjectKind, key: &str, value: &Value| site.field(kind, key, value);

        let (verb, body) = match operation.kind {
            OperationKind::Create => (
                Verb::Create,
                Some(object_expr(operation.object_kind, &operation.payload, field)?),
            ),
            OperationKind::Update => {
                let patch = match &operation.previous_payload {
                    Some(previous) => removal_patch(operation.object_kind, previous, &operation.payload),
                    None => operation.payload.clone(),
                };
                (Verb::Update, Some(object_expr(operation.object_kind, &patch, field)?))
            }
            OperationKind::Delete => (Verb::Delete, None),
        };

        Ok(Statement {
            verb,
            kind: operation.object_kind,
            name: operation.name.clone(),
            body,
        })
    }
}
