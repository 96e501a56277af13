//! Configuration specification types for the catalog reconciler.
//!
//! This module defines the structs that map to the catalog YAML file. They
//! fully describe the desired state of every managed object; the remote
//! catalog is the only record of what currently exists.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::catalog::{DesiredObject, ObjectKind};
use crate::error::{ConfigError, PlanError, Result};

/// Owner marker stamped by the current generation.
pub const OWNER_TAG_CURRENT: &str = "managed:v2";

/// Owner marker stamped by the legacy generation.
pub const OWNER_TAG_LEGACY: &str = "managed:v1";

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogConfig {
    /// Connection settings for the remote catalog.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Desired schema, current generation (atomic batch execution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<SchemaSection>,
    /// Desired schema, legacy generation (stepwise execution).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_v1: Option<SchemaSection>,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Base URL of the catalog API.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the access secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Number of objects requested per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Maximum number of concurrent catalog requests.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Protocol generation, selected by which configuration section is present.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// `catalog:` section. Atomic batches, replace-on-update.
    Current,
    /// `catalog_v1:` section. Stepwise batches, merge-on-update.
    Legacy,
}

/// Retention policy applied when an object disappears from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Leave the object in the catalog.
    Retain,
    /// Delete the object.
    #[default]
    Destroy,
}

/// Desired schema objects, keyed by type then by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct SchemaSection {
    /// Retention policy for objects that do not set one in their `data`.
    #[serde(default)]
    pub retention_policy: RetentionPolicy,
    /// Record collections.
    #[serde(default)]
    pub collections: BTreeMap<String, CollectionSpec>,
    /// Stand-alone indexes (legacy generation only).
    #[serde(default)]
    pub indexes: BTreeMap<String, IndexSpec>,
    /// Stored functions.
    #[serde(default)]
    pub functions: BTreeMap<String, FunctionSpec>,
    /// Access roles.
    #[serde(default)]
    pub roles: BTreeMap<String, RoleSpec>,
}

/// A record collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CollectionSpec {
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
    /// Indexes defined inline (current generation only).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indexes: BTreeMap<String, NestedIndexSpec>,
    /// Constraints such as `{unique: [email]}` (current generation only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<Value>,
    /// Days of document history to keep.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_days: Option<u32>,
    /// Days before documents expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_days: Option<u32>,
}

/// An index nested under a collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct NestedIndexSpec {
    /// Fields the index is searchable by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<IndexField>,
    /// Fields the index returns, in sort order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<IndexField>,
}

/// A stand-alone index (legacy generation).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct IndexSpec {
    /// Source collection, as a snippet such as `Collection("users")`.
    pub source: String,
    /// Fields the index is searchable by.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub terms: Vec<IndexField>,
    /// Fields the index returns, in sort order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<IndexField>,
    /// Whether the index enforces uniqueness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Whether writes are serialized.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialized: Option<bool>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

/// A field referenced by an index.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IndexField {
    /// Dotted field path.
    pub field: String,
    /// Sort descending.
    #[serde(default, skip_serializing_if = "is_false")]
    pub reverse: bool,
    /// Index each element of an array field.
    #[serde(default, skip_serializing_if = "is_false")]
    pub mva: bool,
}

/// A stored function.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FunctionSpec {
    /// Function body (source text, or a snippet in the legacy generation).
    pub body: String,
    /// Role the function runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

/// An access role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RoleSpec {
    /// Privileges granted on other objects.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub privileges: Vec<Privilege>,
    /// Collections whose documents are members of this role.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub membership: Vec<Membership>,
    /// User metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}

/// A privilege on one resource.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Privilege {
    /// Target resource (a name, or a reference snippet in the legacy generation).
    pub resource: String,
    /// Action name to `true`/`false` or a predicate snippet.
    #[serde(default)]
    pub actions: BTreeMap<String, Value>,
}

/// A role membership source.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Membership {
    /// Member collection.
    pub resource: String,
    /// Optional predicate limiting membership.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

// Default value functions

fn default_endpoint() -> String {
    String::from("http://localhost:8443")
}

fn default_secret_env() -> String {
    String::from("CATALOG_SECRET")
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_page_size() -> usize {
    64
}

const fn default_concurrency() -> usize {
    4
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_false(value: &bool) -> bool {
    !*value
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            secret_env: default_secret_env(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl Generation {
    /// Returns the owner marker this generation stamps on its objects.
    #[must_use]
    pub const fn owner_tag(self) -> &'static str {
        match self {
            Self::Current => OWNER_TAG_CURRENT,
            Self::Legacy => OWNER_TAG_LEGACY,
        }
    }

    /// Returns the configuration section that selects this generation.
    #[must_use]
    pub const fn section_key(self) -> &'static str {
        match self {
            Self::Current => "catalog",
            Self::Legacy => "catalog_v1",
        }
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Current => "current",
            Self::Legacy => "legacy",
        };
        write!(f, "{s}")
    }
}

impl RetentionPolicy {
    /// Returns the value stored in an object's `data`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Destroy => "destroy",
        }
    }

    /// Parses a stored value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "retain" => Some(Self::Retain),
            "destroy" => Some(Self::Destroy),
            _ => None,
        }
    }
}

impl CatalogConfig {
    /// Returns the active generation and its schema section.
    ///
    /// # Errors
    ///
    /// Returns an error unless exactly one of `catalog` and `catalog_v1` is present.
    pub fn active_section(&self) -> Result<(Generation, &SchemaSection)> {
        match (&self.catalog, &self.catalog_v1) {
            (Some(section), None) => Ok((Generation::Current, section)),
            (None, Some(section)) => Ok((Generation::Legacy, section)),
            (Some(_), Some(_)) => Err(ConfigError::validation_general(
                "Only one of `catalog` and `catalog_v1` may be present",
            )
            .into()),
            (None, None) => Err(ConfigError::validation_general(
                "Configuration must contain a `catalog` or `catalog_v1` section",
            )
            .into()),
        }
    }
}

impl SchemaSection {
    /// Returns the total number of declared objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.collections.len() + self.indexes.len() + self.functions.len() + self.roles.len()
    }

    /// Builds the desired objects, ordered by kind then name.
    ///
    /// # Errors
    ///
    /// Returns an error if a spec cannot be converted to attributes.
    pub fn desired_objects(&self) -> Result<Vec<DesiredObject>> {
        let mut objects = Vec::with_capacity(self.object_count());
        for kind in ObjectKind::ALL {
            match kind {
                ObjectKind::Collection => push_objects(&mut objects, kind, &self.collections)?,
                ObjectKind::Index => push_objects(&mut objects, kind, &self.indexes)?,
                ObjectKind::Role => push_objects(&mut objects, kind, &self.roles)?,
                ObjectKind::Function => push_objects(&mut objects, kind, &self.functions)?,
            }
        }
        Ok(objects)
    }
}

fn push_objects<T: Serialize>(
    objects: &mut Vec<DesiredObject>,
    kind: ObjectKind,
    specs: &BTreeMap<String, T>,
) -> Result<()> {
    for (name, spec) in specs {
        let attributes = match serde_json::to_value(spec) {
            Ok(Value::Object(map)) => map,
            Ok(_) => Map::new(),
            Err(e) => {
                return Err(PlanError::InvalidAttributes {
                    kind: kind.to_string(),
                    name: name.clone(),
                    message: e.to_string(),
                }
                .into());
            }
        };
        objects.push(DesiredObject::new(kind, name.clone(), dedup_sets(kind, attributes)));
    }
    Ok(())
}

/// Drops repeated entries from set-like fields, keeping the first occurrence.
fn dedup_sets(kind: ObjectKind, mut attributes: Map<String, Value>) -> Map<String, Value> {
    for field in kind.unordered_fields() {
        if let Some(Value::Array(items)) = attributes.get_mut(*field) {
            let mut seen = std::collections::HashSet::new();
            items.retain(|item| seen.insert(item.to_string()));
        }
    }
    attributes
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_active_section_requires_exactly_one() {
        let mut config = CatalogConfig::default();
        assert!(config.active_section().is_err());

        config.catalog_v1 = Some(SchemaSection::default());
        let (generation, _) = config.active_section().unwrap();
        assert_eq!(generation, Generation::Legacy);

        config.catalog = Some(SchemaSection::default());
        assert!(config.active_section().is_err());
    }

    #[test]
    fn test_desired_objects_omit_empty_fields() {
        let mut section = SchemaSection::default();
        section.collections.insert(String::from("C1"), CollectionSpec::default());
        section.functions.insert(
            String::from("login"),
            FunctionSpec {
                body: String::from("x => x"),
                role: Some(String::from("admin")),
                data: BTreeMap::new(),
            },
        );

        let objects = section.desired_objects().unwrap();
        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].kind, ObjectKind::Collection);
        assert!(objects[0].attributes.is_empty());
        assert_eq!(
            Value::Object(objects[1].attributes.clone()),
            json!({"body": "x => x", "role": "admin"})
        );
    }

    #[test]
    fn test_desired_objects_follow_creation_order() {
        let mut section = SchemaSection::default();
        section.functions.insert(String::from("f"), FunctionSpec::default());
        section.roles.insert(String::from("r"), RoleSpec::default());
        section.collections.insert(String::from("c"), CollectionSpec::default());

        let kinds: Vec<_> = section
            .desired_objects()
            .unwrap()
            .into_iter()
            .map(|o| o.kind)
            .collect();
        assert_eq!(kinds, vec![ObjectKind::Collection, ObjectKind::Role, ObjectKind::Function]);
    }

    #[test]
    fn test_duplicate_constraints_are_written_once() {
        let mut section = SchemaSection::default();
        section.collections.insert(
            String::from("users"),
            CollectionSpec {
                constraints: vec![
                    json!({"unique": ["email"]}),
                    json!({"unique": ["email"]}),
                    json!({"unique": ["handle"]}),
                ],
                ..CollectionSpec::default()
            },
        );

        let objects = section.desired_objects().unwrap();
        assert_eq!(
            objects[0].attributes["constraints"],
            json!([{"unique": ["email"]}, {"unique": ["handle"]}])
        );
    }
}
