//! Typed intermediate representation of catalog operations.
//!
//! Backends render a plan into [`Transaction`]s made of [`Statement`]s whose
//! bodies are [`Expr`] trees. Nothing in this representation is executable
//! locally; it is data handed to the catalog.

use serde::Serialize;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::ObjectKind;
use crate::config::Generation;

/// An expression in the catalog query language.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// `null`.
    Null,
    /// A boolean literal.
    Bool(bool),
    /// A numeric literal.
    Number(Number),
    /// A string literal.
    String(String),
    /// An array literal.
    Array(Vec<Expr>),
    /// An object literal.
    Object(BTreeMap<String, Expr>),
    /// A reference to a named catalog object, e.g. `Role("admin")`.
    Ref {
        /// Kind of the referenced object.
        kind: ObjectKind,
        /// Name of the referenced object.
        name: String,
    },
    /// A call to a query-language function, e.g. `Lambda("x", ...)`.
    Call {
        /// Function name.
        name: String,
        /// Arguments in order.
        args: Vec<Expr>,
    },
    /// A bare identifier.
    Var(String),
    /// Opaque source text, passed through verbatim.
    Source(String),
}

impl Expr {
    /// Builds a reference expression.
    #[must_use]
    pub fn reference(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::Ref {
            kind,
            name: name.into(),
        }
    }

    /// Converts the expression to the JSON form the catalog stores.
    ///
    /// Literals map to their JSON counterparts; references, calls and
    /// identifiers are stored as their canonical text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::String(s) | Self::Source(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Ref { .. } | Self::Call { .. } | Self::Var(_) => Value::String(self.to_string()),
        }
    }

    /// Collects every reference in the expression, depth first.
    #[must_use]
    pub fn references(&self) -> Vec<(ObjectKind, &str)> {
        let mut out = Vec::new();
        self.collect_references(&mut out);
        out
    }

    fn collect_references<'a>(&'a self, out: &mut Vec<(ObjectKind, &'a str)>) {
        match self {
            Self::Ref { kind, name } => out.push((*kind, name.as_str())),
            Self::Array(items) | Self::Call { args: items, .. } => {
                for item in items {
                    item.collect_references(out);
                }
            }
            Self::Object(fields) => {
                for value in fields.values() {
                    value.collect_references(out);
                }
            }
            _ => {}
        }
    }
}

impl From<&Value> for Expr {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => Self::Number(n.clone()),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Array(items.iter().map(Self::from).collect()),
            Value::Object(fields) => Self::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Whether an object key can be written without quotes.
fn is_bare_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let quoted = serde_json::to_string(s).map_err(|_| fmt::Error)?;
    f.write_str(&quoted)
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write_quoted(f, s),
            Self::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_bare_key(key) {
                        f.write_str(key)?;
                    } else {
                        write_quoted(f, key)?;
                    }
                    write!(f, ": {value}")?;
                }
                f.write_str("}")
            }
            Self::Ref { kind, name } => {
                write!(f, "{}(", kind.label())?;
                write_quoted(f, name)?;
                f.write_str(")")
            }
            Self::Call { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Var(name) | Self::Source(name) => f.write_str(name),
        }
    }
}

/// Statement verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verb {
    /// Create a new object.
    Create,
    /// Deep-merge the body into an existing object; `null` removes a key.
    Update,
    /// Replace every declared field of an existing object with the body.
    Replace,
    /// Delete an object.
    Delete,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Replace => "Replace",
            Self::Delete => "Delete",
        };
        f.write_str(s)
    }
}

/// A single mutation against one catalog object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    /// What to do.
    pub verb: Verb,
    /// Kind of the target object.
    pub kind: ObjectKind,
    /// Name of the target object.
    pub name: String,
    /// Attributes to write; absent for deletions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Expr>,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target = Expr::reference(self.kind, self.name.clone());
        match &self.body {
            Some(body) => write!(f, "{}({target}, {body})", self.verb),
            None => write!(f, "{}({target})", self.verb),
        }
    }
}

/// A batch of statements the catalog applies all-or-nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    /// Protocol generation the statements are expressed in.
    pub generation: Generation,
    /// Statements, applied in order.
    pub statements: Vec<Statement>,
}

impl Transaction {
    /// Creates an empty transaction for the given generation.
    #[must_use]
    pub const fn new(generation: Generation) -> Self {
        Self {
            generation,
            statements: Vec::new(),
        }
    }

    /// Returns true if the transaction holds no statements.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            writeln!(f, "{statement}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display_quotes_odd_keys() {
        let expr = Expr::from(&json!({"read": true, "my-key": "x"}));
        assert_eq!(expr.to_string(), r#"{"my-key": "x", read: true}"#);
    }

    #[test]
    fn test_references_are_collected_depth_first() {
        let expr = Expr::Call {
            name: String::from("Paginate"),
            args: vec![
                Expr::reference(ObjectKind::Index, "by_email"),
                Expr::Array(vec![Expr::reference(ObjectKind::Collection, "users")]),
            ],
        };
        assert_eq!(
            expr.references(),
            vec![(ObjectKind::Index, "by_email"), (ObjectKind::Collection, "users")]
        );
    }

    #[test]
    fn test_to_json_stores_refs_as_text() {
        let expr = Expr::Object(BTreeMap::from([(
            String::from("role"),
            Expr::reference(ObjectKind::Role, "admin"),
        )]));
        assert_eq!(expr.to_json(), json!({"role": "Role(\"admin\")"}));
    }

    #[test]
    fn test_statement_display() {
        let statement = Statement {
            verb: Verb::Delete,
            kind: ObjectKind::Function,
            name: String::from("login"),
            body: None,
        };
        assert_eq!(statement.to_string(), r#"Delete(Function("login"))"#);
    }
}
