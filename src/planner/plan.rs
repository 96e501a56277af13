//! Plan types and dependency-ordered construction.
//!
//! Roles and functions may reference each other in both directions, so a
//! plan is built in phases: a skeletal phase creates every object without
//! its forward-referencing fields, a relational phase fills those fields in,
//! and a sweep phase deletes orphans last.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

use crate::catalog::ObjectKind;
use crate::report::FieldDiff;

use super::diff::{Classification, DiffResult};
use super::sweep::Deletion;

/// Kind of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Create a new object.
    Create,
    /// Update an existing object.
    Update,
    /// Delete an object.
    Delete,
}

/// Phase an operation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Creates without forward references, and updates of objects without them.
    Skeletal,
    /// Forward-referencing fields.
    Relational,
    /// Deletions.
    Sweep,
}

/// A single planned operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    /// Operation kind.
    pub kind: OperationKind,
    /// Kind of the target object.
    #[serde(rename = "type")]
    pub object_kind: ObjectKind,
    /// Name of the target object.
    pub name: String,
    /// Attributes to write; empty for deletions.
    pub payload: Map<String, Value>,
    /// Attributes stored before this operation, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_payload: Option<Map<String, Value>>,
    /// Phase.
    pub phase: Phase,
    /// Differing fields, for updates of existing objects.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub field_diffs: Vec<FieldDiff>,
    /// True for the relational update completing an object created in this plan.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub follow_up: bool,
}

/// A complete plan.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    /// Content hash of the desired set.
    pub fingerprint: String,
    /// Operations in execution order.
    pub operations: Vec<Operation>,
}

/// Which fields may reference objects created later in the same plan.
#[derive(Debug, Clone)]
pub struct DependencyRules {
    deferred: BTreeMap<ObjectKind, Vec<&'static str>>,
}

impl Default for DependencyRules {
    fn default() -> Self {
        let mut deferred = BTreeMap::new();
        deferred.insert(ObjectKind::Role, vec!["privileges", "membership"]);
        Self { deferred }
    }
}

impl DependencyRules {
    /// Creates rules with no deferred fields.
    #[must_use]
    pub fn none() -> Self {
        Self {
            deferred: BTreeMap::new(),
        }
    }

    /// Marks `field` of `kind` as possibly forward-referencing.
    #[must_use]
    pub fn defer(mut self, kind: ObjectKind, field: &'static str) -> Self {
        self.deferred.entry(kind).or_default().push(field);
        self
    }

    /// Returns the deferred fields of a kind.
    #[must_use]
    pub fn deferred_fields(&self, kind: ObjectKind) -> &[&'static str] {
        self.deferred.get(&kind).map_or(&[][..], Vec::as_slice)
    }

    /// Returns true if `attributes` set any deferred field to a non-empty value.
    #[must_use]
    pub fn has_deferred(&self, kind: ObjectKind, attributes: &Map<String, Value>) -> bool {
        self.deferred_fields(kind)
            .iter()
            .filter_map(|field| attributes.get(*field))
            .any(|value| !is_empty_value(value))
    }

    /// Returns `attributes` without its deferred fields.
    #[must_use]
    pub fn strip(&self, kind: ObjectKind, attributes: &Map<String, Value>) -> Map<String, Value> {
        let deferred = self.deferred_fields(kind);
        attributes
            .iter()
            .filter(|(key, _)| !deferred.iter().any(|f| *f == key.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

/// Builds plans from diffs and sweep results.
#[derive(Debug, Default)]
pub struct Planner {
    rules: DependencyRules,
}

impl Planner {
    /// Creates a planner with the given dependency rules.
    #[must_use]
    pub const fn new(rules: DependencyRules) -> Self {
        Self { rules }
    }

    /// Returns the dependency rules in use.
    #[must_use]
    pub const fn rules(&self) -> &DependencyRules {
        &self.rules
    }

    /// Sequences creates, updates and deletions into a plan.
    #[must_use]
    pub fn plan(&self, diff: &DiffResult, deletions: Vec<Deletion>, fingerprint: impl Into<String>) -> Plan {
        let mut skeletal = Vec::new();
        let mut relational = Vec::new();

        for object_diff in &diff.diffs {
            let desired = &object_diff.desired;
            let kind = desired.kind;
            let deferred = self.rules.has_deferred(kind, &desired.attributes);

            match &object_diff.classification {
                Classification::NoOp => {}
                Classification::Create => {
                    let stripped = self.rules.strip(kind, &desired.attributes);
                    skeletal.push(Operation {
                        kind: OperationKind::Create,
                        object_kind: kind,
                        name: desired.name.clone(),
                        payload: stripped.clone(),
                        previous_payload: None,
                        phase: Phase::Skeletal,
                        field_diffs: Vec::new(),
                        follow_up: false,
                    });
                    if deferred {
                        relational.push(Operation {
                            kind: OperationKind::Update,
                            object_kind: kind,
                            name: desired.name.clone(),
                            payload: desired.attributes.clone(),
                            previous_payload: Some(stripped),
                            phase: Phase::Relational,
                            field_diffs: Vec::new(),
                            follow_up: true,
                        });
                    }
                }
                Classification::Update(field_diffs) => {
                    let operation = Operation {
                        kind: OperationKind::Update,
                        object_kind: kind,
                        name: desired.name.clone(),
                        payload: desired.attributes.clone(),
                        previous_payload: object_diff.observed.clone(),
                        phase: if deferred { Phase::Relational } else { Phase::Skeletal },
                        field_diffs: field_diffs.clone(),
                        follow_up: false,
                    };
                    if deferred {
                        relational.push(operation);
                    } else {
                        skeletal.push(operation);
                    }
                }
            }
        }

        skeletal.sort_by_key(|op| op.object_kind);
        relational.sort_by_key(|op| op.object_kind);

        let mut sweep: Vec<Operation> = deletions
            .into_iter()
            .map(|deletion| Operation {
                kind: OperationKind::Delete,
                object_kind: deletion.kind,
                name: deletion.name,
                payload: Map::new(),
                previous_payload: Some(deletion.previous),
                phase: Phase::Sweep,
                field_diffs: Vec::new(),
                follow_up: false,
            })
            .collect();
        sweep.sort_by(|a, b| b.object_kind.cmp(&a.object_kind).then_with(|| a.name.cmp(&b.name)));

        let mut operations = skeletal;
        operations.extend(relational);
        operations.extend(sweep);

        debug!("Planned {} operations", operations.len());
        Plan {
            fingerprint: fingerprint.into(),
            operations,
        }
    }
}

impl Plan {
    /// Returns true if the plan is empty (no changes).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Returns the number of operations.
    #[must_use]
    pub const fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Returns the number of operations of a kind.
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }

    /// Returns the operations of one phase, in order.
    #[must_use]
    pub fn phase(&self, phase: Phase) -> Vec<&Operation> {
        self.operations.iter().filter(|op| op.phase == phase).collect()
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Skeletal => "skeletal",
            Self::Relational => "relational",
            Self::Sweep => "sweep",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} '{}' [{}]", self.kind, self.object_kind, self.name, self.phase)
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operations.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Plan {} ({} operations):", self.fingerprint, self.operations.len())?;
        for (i, operation) in self.operations.iter().enumerate() {
            writeln!(f, "  {i}. {operation}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DesiredObject, ObservedObject};
    use crate::planner::DiffEngine;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn plan_for(desired: &[DesiredObject], observed: &[ObservedObject]) -> Plan {
        let diff = DiffEngine::new().compute(desired, observed);
        Planner::default().plan(&diff, Vec::new(), "test")
    }

    #[test]
    fn test_mutual_references_are_split_into_phases() {
        let desired = vec![
            DesiredObject::new(
                ObjectKind::Role,
                "caller",
                map(json!({"privileges": [{"resource": "login", "actions": {"call": true}}]})),
            ),
            DesiredObject::new(ObjectKind::Function, "login", map(json!({"body": "x", "role": "caller"}))),
        ];

        let plan = plan_for(&desired, &[]);
        let summary: Vec<_> = plan
            .operations
            .iter()
            .map(|op| (op.kind, op.object_kind, op.phase))
            .collect();
        assert_eq!(
            summary,
            vec![
                (OperationKind::Create, ObjectKind::Role, Phase::Skeletal),
                (OperationKind::Create, ObjectKind::Function, Phase::Skeletal),
                (OperationKind::Update, ObjectKind::Role, Phase::Relational),
            ]
        );
        assert!(!plan.operations[0].payload.contains_key("privileges"));
        assert!(plan.operations[2].payload.contains_key("privileges"));
        assert!(plan.operations[2].follow_up);
    }

    #[test]
    fn test_objects_without_relations_skip_phase_two() {
        let desired = vec![
            DesiredObject::new(ObjectKind::Collection, "users", Map::new()),
            DesiredObject::new(ObjectKind::Role, "empty", map(json!({"privileges": []}))),
        ];
        let plan = plan_for(&desired, &[]);
        assert!(plan.phase(Phase::Relational).is_empty());
        assert_eq!(plan.count(OperationKind::Create), 2);
    }

    #[test]
    fn test_updates_follow_deferred_fields() {
        let desired = vec![
            DesiredObject::new(ObjectKind::Function, "f", map(json!({"body": "new"}))),
            DesiredObject::new(ObjectKind::Role, "r", map(json!({"membership": [{"resource": "users"}]}))),
        ];
        let observed = vec![
            ObservedObject::new(ObjectKind::Function, "f", map(json!({"body": "old"}))),
            ObservedObject::new(ObjectKind::Role, "r", Map::new()),
        ];

        let plan = plan_for(&desired, &observed);
        assert_eq!(plan.phase(Phase::Skeletal)[0].name, "f");
        assert_eq!(plan.phase(Phase::Relational)[0].name, "r");
        assert_eq!(plan.operations[0].field_diffs[0].field, "body");
    }

    #[test]
    fn test_deletions_come_last_in_reverse_kind_order() {
        let deletions = vec![
            Deletion {
                kind: ObjectKind::Collection,
                name: String::from("c"),
                previous: Map::new(),
            },
            Deletion {
                kind: ObjectKind::Function,
                name: String::from("f"),
                previous: Map::new(),
            },
        ];
        let desired = vec![DesiredObject::new(ObjectKind::Collection, "new", Map::new())];
        let diff = DiffEngine::new().compute(&desired, &[]);
        let plan = Planner::default().plan(&diff, deletions, "test");

        let kinds: Vec<_> = plan.operations.iter().map(|op| (op.kind, op.object_kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (OperationKind::Create, ObjectKind::Collection),
                (OperationKind::Delete, ObjectKind::Function),
                (OperationKind::Delete, ObjectKind::Collection),
            ]
        );
    }

    #[test]
    fn test_custom_rules() {
        let rules = DependencyRules::none().defer(ObjectKind::Function, "role");
        let attributes = map(json!({"body": "x", "role": "r"}));
        assert!(rules.has_deferred(ObjectKind::Function, &attributes));
        assert!(!rules.strip(ObjectKind::Function, &attributes).contains_key("role"));
        assert!(!rules.has_deferred(ObjectKind::Role, &attributes));
    }
}
