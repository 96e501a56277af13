//! Diff engine for comparing desired vs observed objects.
//!
//! This module classifies every desired object against its owned,
//! observed counterpart. Only declared fields take part in a comparison;
//! anything the catalog computes on its own is ignored.

use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::catalog::{DesiredObject, ObjectKind, ObservedObject};
use crate::report::FieldDiff;

use super::tagger::{OWNER_TAG_KEY, RETENTION_POLICY_KEY};

/// Engine for computing diffs between desired and observed objects.
#[derive(Debug, Default)]
pub struct DiffEngine;

/// Classification of one desired object.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// The object does not exist yet.
    Create,
    /// The object exists and differs in the listed fields.
    Update(Vec<FieldDiff>),
    /// The object exists and matches.
    NoOp,
}

/// Diff for a single desired object.
#[derive(Debug, Clone)]
pub struct ObjectDiff {
    /// Desired object (tagged and normalized).
    pub desired: DesiredObject,
    /// Stored attributes of the observed counterpart, if any.
    pub observed: Option<Map<String, Value>>,
    /// Classification.
    pub classification: Classification,
}

/// Complete diff result.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// One diff per desired object, in desired order.
    pub diffs: Vec<ObjectDiff>,
    /// Number of objects to create.
    pub creates: usize,
    /// Number of objects to update.
    pub updates: usize,
    /// Number of unchanged objects.
    pub unchanged: usize,
}

impl DiffEngine {
    /// Creates a new diff engine.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Classifies a whole desired set against the observed owned objects.
    #[must_use]
    pub fn compute(&self, desired: &[DesiredObject], observed: &[ObservedObject]) -> DiffResult {
        self.compute_pairs(desired.iter().map(|o| (o, &o.attributes)), observed)
    }

    /// Classifies a desired set, comparing each object through `stored`.
    ///
    /// `stored[i]` is the form the catalog would hold for `desired[i]`. The
    /// diffs keep the desired objects themselves for planning.
    #[must_use]
    pub fn compute_stored(
        &self,
        desired: &[DesiredObject],
        stored: &[Map<String, Value>],
        observed: &[ObservedObject],
    ) -> DiffResult {
        self.compute_pairs(desired.iter().zip(stored), observed)
    }

    fn compute_pairs<'d>(
        &self,
        pairs: impl Iterator<Item = (&'d DesiredObject, &'d Map<String, Value>)>,
        observed: &[ObservedObject],
    ) -> DiffResult {
        let observed_by_key: HashMap<(ObjectKind, &str), &ObservedObject> = observed
            .iter()
            .map(|o| ((o.kind, o.name.as_str()), o))
            .collect();

        let mut result = DiffResult::default();
        for (object, compared) in pairs {
            let counterpart = observed_by_key.get(&(object.kind, object.name.as_str())).copied();
            let classification = Self::compare(object.kind, compared, counterpart);
            match classification {
                Classification::Create => result.creates += 1,
                Classification::Update(_) => result.updates += 1,
                Classification::NoOp => result.unchanged += 1,
            }
            result.diffs.push(ObjectDiff {
                desired: object.clone(),
                observed: counterpart.map(|o| o.attributes.clone()),
                classification,
            });
        }

        debug!(
            "Diff: {} to create, {} to update, {} unchanged",
            result.creates, result.updates, result.unchanged
        );
        result
    }

    /// Classifies one desired object.
    ///
    /// The compared field set is the desired keys plus every declared field
    /// present on the observed object, so a removed field counts as a change.
    /// Inside declared fields, keys the user cannot declare are ignored.
    #[must_use]
    pub fn classify(&self, desired: &DesiredObject, observed: Option<&ObservedObject>) -> Classification {
        Self::compare(desired.kind, &desired.attributes, observed)
    }

    fn compare(kind: ObjectKind, desired: &Map<String, Value>, observed: Option<&ObservedObject>) -> Classification {
        let Some(observed) = observed else {
            return Classification::Create;
        };

        let mut fields: BTreeSet<&str> = desired.keys().map(String::as_str).collect();
        fields.extend(
            kind.declared_fields()
                .iter()
                .copied()
                .filter(|f| observed.attributes.contains_key(*f)),
        );

        let mut diffs = Vec::new();
        for field in fields {
            let unordered = kind.unordered_fields().iter().any(|f| *f == field);
            let entry_fields = kind.entry_fields(field);
            let before = observed
                .attributes
                .get(field)
                .map(|v| canonical(&project(v, entry_fields), unordered));
            let after = desired.get(field).map(|v| canonical(v, unordered));
            if before == after {
                continue;
            }
            diffs.push(if field == "data" {
                data_diff(before, after)
            } else {
                FieldDiff {
                    field: field.to_string(),
                    before,
                    after,
                }
            });
        }

        if diffs.is_empty() {
            Classification::NoOp
        } else {
            Classification::Update(diffs)
        }
    }
}

/// Drops catalog-computed keys from the entries of an observed field.
fn project(value: &Value, entry_fields: Option<&[&str]>) -> Value {
    let Some(allowed) = entry_fields else {
        return value.clone();
    };
    let keep = |entry: &Value| match entry {
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .filter(|(k, _)| allowed.iter().any(|f| *f == k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    };
    match value {
        Value::Object(entries) => Value::Object(entries.iter().map(|(k, v)| (k.clone(), keep(v))).collect()),
        Value::Array(entries) => Value::Array(entries.iter().map(keep).collect()),
        other => other.clone(),
    }
}

/// Returns a copy of `value` with set-like arrays sorted and deduplicated.
fn canonical(value: &Value, unordered: bool) -> Value {
    match value {
        Value::Array(items) if unordered => {
            let mut keyed: Vec<(String, Value)> = items.iter().map(|v| (v.to_string(), v.clone())).collect();
            keyed.sort_by(|a, b| a.0.cmp(&b.0));
            keyed.dedup_by(|a, b| a.0 == b.0);
            Value::Array(keyed.into_iter().map(|(_, v)| v).collect())
        }
        other => other.clone(),
    }
}

/// Builds the `data` diff, hiding reserved keys that did not change.
fn data_diff(before: Option<Value>, after: Option<Value>) -> FieldDiff {
    let mut before = before;
    let mut after = after;
    for key in [OWNER_TAG_KEY, RETENTION_POLICY_KEY] {
        let old = before.as_ref().and_then(|v| v.get(key));
        let new = after.as_ref().and_then(|v| v.get(key));
        if old.is_some() && old == new {
            if let Some(Value::Object(map)) = before.as_mut() {
                map.remove(key);
            }
            if let Some(Value::Object(map)) = after.as_mut() {
                map.remove(key);
            }
        }
    }
    FieldDiff {
        field: String::from("data"),
        before,
        after,
    }
}

impl DiffResult {
    /// Returns true if any object needs a create or an update.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ObjectDiff> {
        self.diffs
            .iter()
            .filter(|d| d.classification != Classification::NoOp)
            .collect()
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Update(fields) => {
                write!(f, "update (")?;
                for (i, diff) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", diff.field)?;
                }
                write!(f, ")")
            }
            Self::NoOp => write!(f, "no change"),
        }
    }
}
