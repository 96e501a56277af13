//! Current-generation backend.
//!
//! Plans are submitted as one atomic transaction; updates replace every
//! declared field; function bodies are opaque source text and references
//! are plain names.

use serde_json::Value;

use crate::catalog::{DesiredObject, ObjectKind};
use crate::config::Generation;
use crate::error::Result;
use crate::planner::{Operation, OperationKind};
use crate::query::{Expr, Statement, Verb};

use super::{Backend, ExecutionMode, object_expr};

/// Backend for the `catalog:` section.
#[derive(Debug, Default)]
pub struct CurrentBackend;

impl CurrentBackend {
    /// Creates a new backend.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

fn field_expr(kind: ObjectKind, key: &str, value: &Value) -> Result<Expr> {
    Ok(match (kind, key, value) {
        (ObjectKind::Function, "body", Value::String(source)) => Expr::Source(source.clone()),
        _ => Expr::from(value),
    })
}

impl Backend for CurrentBackend {
    fn generation(&self) -> Generation {
        Generation::Current
    }

    fn execution_mode(&self) -> ExecutionMode {
        ExecutionMode::Atomic
    }

    fn normalize(&self, object: DesiredObject) -> Result<DesiredObject> {
        Ok(object)
    }

    fn render(&self, operation: &Operation) -> Result<Statement> {
        let (verb, body) = match operation.kind {
            OperationKind::Create => (
                Verb::Create,
                Some(object_expr(operation.object_kind, &operation.payload, field_expr)?),
            ),
            OperationKind::Update => (
                Verb::Replace,
                Some(object_expr(operation.object_kind, &operation.payload, field_expr)?),
            ),
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::Phase;
    use serde_json::{Map, json};

    fn operation(kind: OperationKind, payload: Value) -> Operation {
        Operation {
            kind,
            object_kind: ObjectKind::Function,
            name: String::from("login"),
            payload: match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            previous_payload: None,
            phase: Phase::Skeletal,
            field_diffs: Vec::new(),
            follow_up: false,
        }
    }

    #[test]
    fn test_update_is_replace() {
        let statement = CurrentBackend::new()
            .render(&operation(OperationKind::Update, json!({"body": "x => x", "role": "admin"})))
            .unwrap();
        assert_eq!(statement.verb, Verb::Replace);
        assert_eq!(
            statement.to_string(),
            r#"Replace(Function("login"), {body: x => x, role: "admin"})"#
        );
    }

    #[test]
    fn test_delete_has_no_body() {
        let statement = CurrentBackend::new()
            .render(&operation(OperationKind::Delete, json!({})))
            .unwrap();
        assert_eq!(statement.verb, Verb::Delete);
        assert!(statement.body.is_none());
    }

    #[test]
    fn test_body_is_stored_verbatim() {
        let statement = CurrentBackend::new()
            .render(&operation(OperationKind::Create, json!({"body": "x => x"})))
            .unwrap();
        assert_eq!(statement.body.unwrap().to_json(), json!({"body": "x => x"}));
    }
}
