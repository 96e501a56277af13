//! Versioned backend adapters.
//!
//! The two catalog generations differ in owner marker, execution mode,
//! update primitive and how snippet-valued fields are expressed. Everything
//! above this module is generation-agnostic.

mod current;
mod legacy;

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::catalog::{DesiredObject, ObjectKind};
use crate::config::Generation;
use crate::error::Result;
use crate::planner::Operation;
use crate::query::{Expr, Statement};

pub use current::CurrentBackend;
pub use legacy::LegacyBackend;

/// How a plan is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One all-or-nothing transaction.
    Atomic,
    /// A fixed sequence of independently committed steps.
    Stepwise,
}

/// Generation-specific behavior.
pub trait Backend: Send + Sync {
    /// Protocol generation implemented by this backend.
    fn generation(&self) -> Generation;

    /// How plans are submitted.
    fn execution_mode(&self) -> ExecutionMode;

    /// Canonicalizes desired attributes so that cosmetic differences never
    /// produce an update. Snippet-valued fields stay renderable.
    ///
    /// # Errors
    ///
    /// Returns an error if a snippet-valued field cannot be parsed.
    fn normalize(&self, object: DesiredObject) -> Result<DesiredObject>;

    /// Returns the attributes the catalog would hold for a normalized object.
    ///
    /// # Errors
    ///
    /// Returns an error if a snippet-valued field cannot be parsed.
    fn stored_form(&self, object: &DesiredObject) -> Result<Map<String, Value>> {
        Ok(object.attributes.clone())
    }

    /// Renders one planned operation as a statement.
    ///
    /// # Errors
    ///
    /// Returns an error if a snippet-valued field cannot be parsed.
    fn render(&self, operation: &Operation) -> Result<Statement>;
}

/// Returns the backend for a generation.
#[must_use]
pub fn backend_for(generation: Generation) -> Box<dyn Backend> {
    match generation {
        Generation::Current => Box::new(CurrentBackend::new()),
        Generation::Legacy => Box::new(LegacyBackend::new()),
    }
}

/// Builds an object expression, converting each field with `field`.
fn object_expr<F>(kind: ObjectKind, payload: &Map<String, Value>, mut field: F) -> Result<Expr>
where
    F: FnMut(ObjectKind, &str, &Value) -> Result<Expr>,
{
    let mut fields = BTreeMap::new();
    for (key, value) in payload {
        fields.insert(key.clone(), field(kind, key, value)?);
    }
    Ok(Expr::Object(fields))
}
