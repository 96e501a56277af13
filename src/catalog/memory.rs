//! In-memory catalog used by tests.
//!
//! Behaves like the remote catalog where the reconciler depends on it:
//! sorted cursor pagination, all-or-nothing transactions, reference
//! checking, merge versus replace updates and name uniqueness.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::config::Generation;
use crate::error::{RemoteError, Result};
use crate::query::{Expr, Statement, Transaction, Verb};

use super::client::RemoteClient;
use super::types::{ObjectKind, ObservedObject, OutcomeAction, OutcomeRecord, Page};

const BUILTIN_ROLES: &[&str] = &["admin", "server", "server-readonly"];

type Store = BTreeMap<(ObjectKind, String), Map<String, Value>>;

/// In-memory catalog.
pub struct MemoryCatalog {
    objects: Mutex<Store>,
    page_size: usize,
    submitted: Mutex<Vec<Transaction>>,
    list_calls: AtomicUsize,
    fail_at: Mutex<Option<usize>>,
    clock: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            page_size,
            submitted: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            fail_at: Mutex::new(None),
            clock: AtomicUsize::new(1),
        }
    }

    /// Seeds an object directly, bypassing transactions.
    pub fn insert(&self, kind: ObjectKind, name: &str, attributes: Value) {
        let Value::Object(map) = attributes else {
            panic!("attributes must be an object");
        };
        self.objects.lock().unwrap().insert((kind, name.to_string()), map);
    }

    pub fn get(&self, kind: ObjectKind, name: &str) -> Option<Map<String, Value>> {
        self.objects.lock().unwrap().get(&(kind, name.to_string())).cloned()
    }

    pub fn contains(&self, kind: ObjectKind, name: &str) -> bool {
        self.get(kind, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Transactions accepted or rejected so far, in submission order.
    pub fn submitted(&self) -> Vec<Transaction> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Makes the `n`th query call (zero-based) fail with a server error.
    pub fn fail_query(&self, n: usize) {
        *self.fail_at.lock().unwrap() = Some(n);
    }

    fn apply(&self, store: &mut Store, index: usize, statement: &Statement, generation: Generation) -> Result<OutcomeAction> {
        let key = (statement.kind, statement.name.clone());
        let conflict = |message: String| RemoteError::Conflict {
            index: Some(index),
            message,
        };

        let body = match (&statement.verb, &statement.body) {
            (Verb::Delete, _) => Map::new(),
            (_, Some(body)) => match body.to_json() {
                Value::Object(map) => map,
                _ => return Err(conflict(String::from("body must be an object")).into()),
            },
            (_, None) => return Err(conflict(String::from("missing body")).into()),
        };

        let action = match statement.verb {
            Verb::Create => {
                if store.contains_key(&key) {
                    return Err(conflict(format!("{} '{}' already exists", key.0, key.1)).into());
                }
                let mut stored: Map<String, Value> =
                    body.into_iter().filter(|(_, v)| !v.is_null()).collect();
                stamp_indexes(&mut stored);
                stored.insert(String::from("ts"), json!(self.tick()));
                store.insert(key.clone(), stored);
                OutcomeAction::Created
            }
            Verb::Update | Verb::Replace => {
                let Some(existing) = store.get(&key).cloned() else {
                    return Err(conflict(format!("{} '{}' not found", key.0, key.1)).into());
                };
                let mut next = existing.clone();
                if statement.verb == Verb::Update {
                    merge(&mut next, &body);
                } else {
                    for field in statement.kind.declared_fields() {
                        next.remove(*field);
                    }
                    next.extend(body.into_iter().filter(|(_, v)| !v.is_null()));
                }
                stamp_indexes(&mut next);
                if next == existing {
                    OutcomeAction::NoOp
                } else {
                    next.insert(String::from("ts"), json!(self.tick()));
                    store.insert(key.clone(), next);
                    OutcomeAction::Updated
                }
            }
            Verb::Delete => {
                if store.remove(&key).is_none() {
                    return Err(conflict(format!("{} '{}' not found", key.0, key.1)).into());
                }
                OutcomeAction::Deleted
            }
        };

        if statement.verb != Verb::Delete {
            check_references(store, statement, generation).map_err(conflict)?;
        }
        Ok(action)
    }

    fn tick(&self) -> usize {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }
}

/// Adds the build state the catalog reports on every nested index.
fn stamp_indexes(stored: &mut Map<String, Value>) {
    if let Some(Value::Object(indexes)) = stored.get_mut("indexes") {
        for index in indexes.values_mut() {
            if let Value::Object(fields) = index {
                fields.insert(String::from("status"), json!("complete"));
                fields.insert(String::from("queryable"), json!(true));
            }
        }
    }
}

fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match value {
            Value::Null => {
                target.remove(key);
            }
            Value::Object(inner) => {
                if let Some(Value::Object(existing)) = target.get_mut(key) {
                    merge(existing, inner);
                } else {
                    let mut fresh = Map::new();
                    merge(&mut fresh, inner);
                    target.insert(key.clone(), Value::Object(fresh));
                }
            }
            other => {
                target.insert(key.clone(), other.clone());
            }
        }
    }
}

fn exists(store: &Store, kind: ObjectKind, name: &str) -> bool {
    (kind == ObjectKind::Role && BUILTIN_ROLES.contains(&name))
        || store.contains_key(&(kind, name.to_string()))
}

fn check_references(store: &Store, statement: &Statement, generation: Generation) -> std::result::Result<(), String> {
    match generation {
        Generation::Legacy => {
            let references = statement.body.as_ref().map(Expr::references).unwrap_or_default();
            for (kind, name) in references {
                if !exists(store, kind, name) {
                    return Err(format!("invalid reference {kind}(\"{name}\")"));
                }
            }
        }
        Generation::Current => {
            let Some(stored) = store.get(&(statement.kind, statement.name.clone())) else {
                return Ok(());
            };
            if let Some(role) = stored.get("role").and_then(Value::as_str)
                && !exists(store, ObjectKind::Role, role)
            {
                return Err(format!("role '{role}' does not exist"));
            }
            for field in ["privileges", "membership"] {
                let entries = stored.get(field).and_then(Value::as_array).cloned().unwrap_or_default();
                for entry in entries {
                    let Some(resource) = entry.get("resource").and_then(Value::as_str) else {
                        continue;
                    };
                    if !ObjectKind::ALL.iter().any(|kind| exists(store, *kind, resource)) {
                        return Err(format!("resource '{resource}' does not exist"));
                    }
                }
            }
        }
    }
    Ok(())
}

#[async_trait]
impl RemoteClient for MemoryCatalog {
    async fn list_page(&self, kind: ObjectKind, cursor: Option<String>) -> Result<Page> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap();

        let mut remaining = objects
            .iter()
            .filter(|((k, name), _)| *k == kind && cursor.as_ref().is_none_or(|c| name > c))
            .map(|((k, name), attributes)| {
                let mut attributes = attributes.clone();
                attributes.insert(String::from("status"), json!("active"));
                ObservedObject::new(*k, name.clone(), attributes)
            });

        let items: Vec<_> = remaining.by_ref().take(self.page_size).collect();
        let after = if remaining.next().is_some() {
            items.last().map(|o| o.name.clone())
        } else {
            None
        };
        Ok(Page { items, after })
    }

    async fn query(&self, transaction: &Transaction) -> Result<Vec<OutcomeRecord>> {
        self.submitted.lock().unwrap().push(transaction.clone());
        let call = self.submitted.lock().unwrap().len() - 1;
        if *self.fail_at.lock().unwrap() == Some(call) {
            return Err(RemoteError::api_error(503, "catalog unavailable").into());
        }

        let mut working = self.objects.lock().unwrap().clone();
        let mut outcomes = Vec::with_capacity(transaction.statements.len());
        for (index, statement) in transaction.statements.iter().enumerate() {
            let action = self.apply(&mut working, index, statement, transaction.generation)?;
            outcomes.push(OutcomeRecord {
                kind: statement.kind,
                name: statement.name.clone(),
                action,
            });
        }

        *self.objects.lock().unwrap() = working;
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CatalogSyncError;

    fn statement(verb: Verb, kind: ObjectKind, name: &str, body: Option<Value>) -> Statement {
        Statement {
            verb,
            kind,
            name: name.to_string(),
            body: body.as_ref().map(Expr::from),
        }
    }

    #[tokio::test]
    async fn test_pagination_is_sorted_with_cursor() {
        let catalog = MemoryCatalog::new(2);
        for name in ["c", "a", "b"] {
            catalog.insert(ObjectKind::Collection, name, json!({}));
        }

        let first = catalog.list_page(ObjectKind::Collection, None).await.unwrap();
        assert_eq!(first.items.iter().map(|o| o.name.as_str()).collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(first.after.as_deref(), Some("b"));

        let second = catalog.list_page(ObjectKind::Collection, first.after).await.unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.after, None);
    }

    #[tokio::test]
    async fn test_failed_transaction_changes_nothing() {
        let catalog = MemoryCatalog::new(10);
        let mut transaction = Transaction::new(Generation::Current);
        transaction.statements.push(statement(Verb::Create, ObjectKind::Collection, "a", Some(json!({}))));
        transaction.statements.push(statement(Verb::Delete, ObjectKind::Role, "missing", None));

        let result = catalog.query(&transaction).await;
        assert!(matches!(
            result,
            Err(CatalogSyncError::Remote(RemoteError::Conflict { index: Some(1), .. }))
        ));
        assert_eq!(catalog.len(), 0);
    }

    #[tokio::test]
    async fn test_update_merges_and_replace_overwrites() {
        let catalog = MemoryCatalog::new(10);
        catalog.insert(ObjectKind::Role, "r", json!({"data": {"a": 1, "b": 2}, "privileges": []}));

        let mut transaction = Transaction::new(Generation::Legacy);
        transaction.statements.push(statement(Verb::Update, ObjectKind::Role, "r", Some(json!({"data": {"a": null, "c": 3}}))));
        catalog.query(&transaction).await.unwrap();
        assert_eq!(catalog.get(ObjectKind::Role, "r").unwrap()["data"], json!({"b": 2, "c": 3}));

        let mut transaction = Transaction::new(Generation::Current);
        transaction.statements.push(statement(Verb::Replace, ObjectKind::Role, "r", Some(json!({"data": {"d": 4}}))));
        catalog.query(&transaction).await.unwrap();
        let stored = catalog.get(ObjectKind::Role, "r").unwrap();
        assert_eq!(stored["data"], json!({"d": 4}));
        assert!(!stored.contains_key("privileges"));
        assert!(stored.contains_key("ts"));
    }

    #[tokio::test]
    async fn test_nested_indexes_report_build_state() {
        let catalog = MemoryCatalog::new(10);
        let mut transaction = Transaction::new(Generation::Current);
        transaction.statements.push(statement(
            Verb::Create,
            ObjectKind::Collection,
            "users",
            Some(json!({"indexes": {"by_email": {"terms": [{"field": "email"}]}}})),
        ));
        catalog.query(&transaction).await.unwrap();

        let stored = catalog.get(ObjectKind::Collection, "users").unwrap();
        assert_eq!(
            stored["indexes"]["by_email"],
            json!({"terms": [{"field": "email"}], "status": "complete", "queryable": true})
        );
    }

    #[tokio::test]
    async fn test_unresolved_reference_is_rejected() {
        let catalog = MemoryCatalog::new(10);
        let mut transaction = Transaction::new(Generation::Current);
        transaction.statements.push(statement(
            Verb::Create,
            ObjectKind::Role,
            "r",
            Some(json!({"privileges": [{"resource": "f", "actions": {"call": true}}]})),
        ));

        assert!(catalog.query(&transaction).await.is_err());
    }
}
