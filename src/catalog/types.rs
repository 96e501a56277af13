//! Catalog types and data structures.
//!
//! This module defines the managed object kinds and the shapes exchanged
//! with the remote catalog: observed objects, listing pages and per-statement
//! outcome records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of a managed catalog object.
///
/// Variants are declared in creation order, so the derived `Ord` sorts
/// kinds the way the planner must create them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    /// A record collection.
    Collection,
    /// A stand-alone index (legacy generation).
    Index,
    /// An access role.
    Role,
    /// A stored function.
    Function,
}

impl ObjectKind {
    /// All kinds in creation order.
    pub const ALL: [Self; 4] = [Self::Collection, Self::Index, Self::Role, Self::Function];

    /// Returns the configuration section holding objects of this kind.
    #[must_use]
    pub const fn section(self) -> &'static str {
        match self {
            Self::Collection => "collections",
            Self::Index => "indexes",
            Self::Role => "roles",
            Self::Function => "functions",
        }
    }

    /// Returns the reference constructor name, e.g. `Collection` in `Collection("users")`.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Collection => "Collection",
            Self::Index => "Index",
            Self::Role => "Role",
            Self::Function => "Function",
        }
    }

    /// Resolves a reference constructor name back to its kind.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.label() == label)
    }

    /// Attribute names a user may declare for this kind.
    ///
    /// Anything else on an observed object is computed by the catalog and
    /// never takes part in a comparison.
    #[must_use]
    pub const fn declared_fields(self) -> &'static [&'static str] {
        match self {
            Self::Collection => &["data", "indexes", "constraints", "history_days", "ttl_days"],
            Self::Index => &["source", "terms", "values", "unique", "serialized", "data"],
            Self::Role => &["privileges", "membership", "data"],
            Self::Function => &["body", "role", "data"],
        }
    }

    /// Keys a user may declare inside each entry of a declared field.
    ///
    /// Entries are the values of a map (`Collection.indexes`) or the
    /// elements of an array (`Role.privileges`). Other keys found there are
    /// computed by the catalog.
    #[must_use]
    pub fn entry_fields(self, field: &str) -> Option<&'static [&'static str]> {
        match (self, field) {
            (Self::Collection, "indexes") => Some(&["terms", "values"]),
            (Self::Role, "privileges") => Some(&["resource", "actions"]),
            (Self::Role, "membership") => Some(&["resource", "predicate"]),
            _ => None,
        }
    }

    /// Array fields whose element order carries no meaning.
    #[must_use]
    pub const fn unordered_fields(self) -> &'static [&'static str] {
        match self {
            Self::Collection => &["constraints"],
            Self::Role => &["privileges", "membership"],
            Self::Index | Self::Function => &[],
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An object as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DesiredObject {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object name, unique within its kind.
    pub name: String,
    /// Declared attributes; undeclared optional fields are absent.
    pub attributes: Map<String, Value>,
}

impl DesiredObject {
    /// Creates a desired object.
    #[must_use]
    pub fn new(kind: ObjectKind, name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes,
        }
    }
}

/// An object as stored in the remote catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedObject {
    /// Object kind.
    pub kind: ObjectKind,
    /// Object name, unique within its kind.
    pub name: String,
    /// Stored attributes, including catalog-computed fields.
    pub attributes: Map<String, Value>,
}

impl ObservedObject {
    /// Creates an observed object.
    #[must_use]
    pub fn new(kind: ObjectKind, name: impl Into<String>, attributes: Map<String, Value>) -> Self {
        Self {
            kind,
            name: name.into(),
            attributes,
        }
    }

    /// Returns the stored `data` map, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.attributes.get("data").and_then(Value::as_object)
    }
}

/// One page of a catalog listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Objects on this page.
    pub items: Vec<ObservedObject>,
    /// Cursor for the next page; `None` on the last page.
    pub after: Option<String>,
}

/// Resolution of a single submitted statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutcomeAction {
    /// The object was created.
    #[serde(rename = "created")]
    Created,
    /// The object was updated.
    #[serde(rename = "updated")]
    Updated,
    /// The object was deleted.
    #[serde(rename = "deleted")]
    Deleted,
    /// The statement left the object unchanged.
    #[serde(rename = "no-op")]
    NoOp,
}

impl std::fmt::Display for OutcomeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::NoOp => "no-op",
        };
        write!(f, "{s}")
    }
}

/// Classification record returned by the catalog for each statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    /// Object kind.
    #[serde(rename = "type")]
    pub kind: ObjectKind,
    /// Object name.
    pub name: String,
    /// What happened to the object.
    pub action: OutcomeAction,
}
