//! Plan executor for applying plans to the catalog.
//!
//! This module renders a plan into transactions, submits them and matches
//! every returned outcome record to the operation it resolves.

use tracing::{debug, error, info};

use crate::backend::{Backend, ExecutionMode};
use crate::catalog::{ObjectKind, OutcomeAction, RemoteClient};
use crate::error::{CatalogSyncError, ReconcileError, RemoteError, Result};
use crate::query::Transaction;

use super::plan::{Operation, Phase, Plan};

/// Fixed step of a stepwise submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Step {
    /// Skeletal collection operations.
    Collections,
    /// Skeletal index operations.
    Indexes,
    /// Skeletal role operations.
    RolesSkeletal,
    /// Skeletal function operations.
    Functions,
    /// Relational operations.
    RolesRelational,
    /// Deletions.
    Deletions,
}

impl Step {
    /// All steps in submission order.
    pub const ALL: [Self; 6] = [
        Self::Collections,
        Self::Indexes,
        Self::RolesSkeletal,
        Self::Functions,
        Self::RolesRelational,
        Self::Deletions,
    ];

    /// Returns the step an operation is submitted in.
    #[must_use]
    pub const fn of(operation: &Operation) -> Self {
        match (operation.phase, operation.object_kind) {
            (Phase::Sweep, _) => Self::Deletions,
            (Phase::Relational, _) => Self::RolesRelational,
            (Phase::Skeletal, ObjectKind::Collection) => Self::Collections,
            (Phase::Skeletal, ObjectKind::Index) => Self::Indexes,
            (Phase::Skeletal, ObjectKind::Role) => Self::RolesSkeletal,
            (Phase::Skeletal, ObjectKind::Function) => Self::Functions,
        }
    }

    /// Returns the step name.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Collections => "collections",
            Self::Indexes => "indexes",
            Self::RolesSkeletal => "roles-skeletal",
            Self::Functions => "functions",
            Self::RolesRelational => "roles-relational",
            Self::Deletions => "deletions",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A group of operations submitted as one transaction.
#[derive(Debug)]
pub struct Batch<'p> {
    /// Step, for stepwise submission.
    pub step: Option<Step>,
    /// Operations in submission order.
    pub operations: Vec<&'p Operation>,
    /// Rendered transaction.
    pub transaction: Transaction,
}

/// Resolution of one operation.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The operation.
    pub operation: Operation,
    /// What the catalog did.
    pub action: OutcomeAction,
}

/// Executor for plans.
pub struct PlanExecutor<'a> {
    /// Catalog connection.
    client: &'a dyn RemoteClient,
    /// Generation-specific rendering.
    backend: &'a dyn Backend,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub fn new(client: &'a dyn RemoteClient, backend: &'a dyn Backend) -> Self {
        Self { client, backend }
    }

    /// Splits and renders a plan into the transactions that would be submitted.
    ///
    /// Empty steps are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if an operation cannot be rendered.
    pub fn batches<'p>(&self, plan: &'p Plan) -> Result<Vec<Batch<'p>>> {
        let groups: Vec<(Option<Step>, Vec<&Operation>)> = match self.backend.execution_mode() {
            ExecutionMode::Atomic => vec![(None, plan.operations.iter().collect())],
            ExecutionMode::Stepwise => Step::ALL
                .into_iter()
                .map(|step| {
                    let ops = plan.operations.iter().filter(|op| Step::of(op) == step).collect();
                    (Some(step), ops)
                })
                .collect(),
        };

        let mut batches = Vec::new();
        for (step, operations) in groups {
            if operations.is_empty() {
                continue;
            }
            let mut transaction = Transaction::new(self.backend.generation());
            for operation in &operations {
                transaction.statements.push(self.backend.render(operation)?);
            }
            batches.push(Batch {
                step,
                operations,
                transaction,
            });
        }
        Ok(batches)
    }

    /// Executes a plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog rejects a transaction, a request
    /// fails or the outcome records do not match the submitted operations.
    /// In stepwise mode a failure after a committed step is reported as
    /// [`ReconcileError::PartiallyApplied`].
    pub async fn execute(&self, plan: &Plan) -> Result<Vec<Outcome>> {
        info!("Executing plan with {} operations", plan.operations.len());

        let batches = self.batches(plan)?;
        let total = batches.len();
        let mut outcomes = Vec::with_capacity(plan.operations.len());

        for (committed, batch) in batches.iter().enumerate() {
            if let Some(step) = batch.step {
                debug!("Submitting step {step} ({} statements)", batch.operations.len());
            }

            let result = match self.client.query(&batch.transaction).await {
                Ok(records) => Self::match_outcomes(&batch.operations, records),
                Err(e) => Err(Self::attribute(e, &batch.operations)),
            };

            match result {
                Ok(resolved) => outcomes.extend(resolved),
                Err(e) => {
                    error!("Transaction failed: {e}");
                    return Err(match batch.step {
                        Some(step) if committed > 0 => ReconcileError::PartiallyApplied {
                            step: step.to_string(),
                            committed,
                            total,
                            reason: e.to_string(),
                        }
                        .into(),
                        _ => e,
                    });
                }
            }
        }

        info!("Plan applied ({} transactions)", total);
        Ok(outcomes)
    }

    /// Pairs outcome records with the operations they resolve.
    fn match_outcomes(
        operations: &[&Operation],
        records: Vec<crate::catalog::OutcomeRecord>,
    ) -> Result<Vec<Outcome>> {
        if records.len() != operations.len() {
            return Err(RemoteError::invalid_response(format!(
                "Expected {} outcome records, got {}",
                operations.len(),
                records.len()
            ))
            .into());
        }

        operations
            .iter()
            .zip(records)
            .map(|(operation, record)| {
                if record.kind != operation.object_kind || record.name != operation.name {
                    return Err(RemoteError::invalid_response(format!(
                        "Outcome for {} '{}' does not match operation on {} '{}'",
                        record.kind, record.name, operation.object_kind, operation.name
                    ))
                    .into());
                }
                Ok(Outcome {
                    operation: (*operation).clone(),
                    action: record.action,
                })
            })
            .collect()
    }

    /// Maps a rejection carrying a statement index back to its operation.
    fn attribute(error: CatalogSyncError, operations: &[&Operation]) -> CatalogSyncError {
        if let CatalogSyncError::Remote(RemoteError::Conflict {
            index: Some(index),
            message,
        }) = &error
            && let Some(operation) = operations.get(*index)
        {
            return ReconcileError::OperationRejected {
                action: operation.kind.to_string(),
                resource_type: operation.object_kind.to_string(),
                name: operation.name.clone(),
                reason: message.clone(),
            }
            .into();
        }
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CurrentBackend, LegacyBackend};
    use crate::catalog::{MockRemoteClient, OutcomeRecord};
    use crate::planner::OperationKind;
    use serde_json::Map;

    fn operation(kind: OperationKind, object_kind: ObjectKind, name: &str, phase: Phase) -> Operation {
        Operation {
            kind,
            object_kind,
            name: name.to_string(),
            payload: Map::new(),
            previous_payload: None,
            phase,
            field_diffs: Vec::new(),
            follow_up: false,
        }
    }

    fn sample_plan() -> Plan {
        Plan {
            fingerprint: String::from("test"),
            operations: vec![
                operation(OperationKind::Create, ObjectKind::Collection, "c", Phase::Skeletal),
                operation(OperationKind::Create, ObjectKind::Role, "r", Phase::Skeletal),
                operation(OperationKind::Create, ObjectKind::Function, "f", Phase::Skeletal),
                operation(OperationKind::Update, ObjectKind::Role, "r", Phase::Relational),
                operation(OperationKind::Delete, ObjectKind::Index, "old", Phase::Sweep),
            ],
        }
    }

    fn echo(transaction: &Transaction) -> Vec<OutcomeRecord> {
        transaction
            .statements
            .iter()
            .map(|s| OutcomeRecord {
                kind: s.kind,
                name: s.name.clone(),
                action: OutcomeAction::Created,
            })
            .collect()
    }

    #[test]
    fn test_stepwise_batches_follow_fixed_order() {
        let client = MockRemoteClient::new();
        let backend = LegacyBackend::new();
        let plan = sample_plan();
        let batches = PlanExecutor::new(&client, &backend).batches(&plan).unwrap();

        let steps: Vec<_> = batches.iter().filter_map(|b| b.step).collect();
        assert_eq!(
            steps,
            vec![
                Step::Collections,
                Step::RolesSkeletal,
                Step::Functions,
                Step::RolesRelational,
                Step::Deletions,
            ]
        );
    }

    #[tokio::test]
    async fn test_atomic_mode_submits_once() {
        let mut client = MockRemoteClient::new();
        client.expect_query().times(1).returning(|t| Ok(echo(t)));
        let backend = CurrentBackend::new();

        let outcomes = PlanExecutor::new(&client, &backend).execute(&sample_plan()).await.unwrap();
        assert_eq!(outcomes.len(), 5);
    }

    #[tokio::test]
    async fn test_mismatched_outcome_is_invalid_response() {
        let mut client = MockRemoteClient::new();
        client.expect_query().returning(|t| {
            let mut records = echo(t);
            records.reverse();
            Ok(records)
        });
        let backend = CurrentBackend::new();

        let result = PlanExecutor::new(&client, &backend).execute(&sample_plan()).await;
        assert!(matches!(
            result,
            Err(CatalogSyncError::Remote(RemoteError::InvalidResponse { .. }))
        ));
    }

    #[tokio::test]
    async fn test_conflict_names_the_operation() {
        let mut client = MockRemoteClient::new();
        client.expect_query().returning(|_| {
            Err(RemoteError::Conflict {
                index: Some(2),
                message: String::from("invalid reference"),
            }
            .into())
        });
        let backend = CurrentBackend::new();

        let result = PlanExecutor::new(&client, &backend).execute(&sample_plan()).await;
        match result {
            Err(CatalogSyncError::Reconcile(ReconcileError::OperationRejected {
                action,
                resource_type,
                name,
                ..
            })) => {
                assert_eq!(action, "create");
                assert_eq!(resource_type, "Function");
                assert_eq!(name, "f");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stepwise_failure_after_commit_is_partial() {
        let mut client = MockRemoteClient::new();
        let mut calls = 0;
        client.expect_query().returning(move |t| {
            calls += 1;
            if calls == 3 {
                Err(RemoteError::api_error(503, "unavailable").into())
            } else {
                Ok(echo(t))
            }
        });
        let backend = LegacyBackend::new();

        let result = PlanExecutor::new(&client, &backend).execute(&sample_plan()).await;
        match result {
            Err(CatalogSyncError::Reconcile(ReconcileError::PartiallyApplied {
                step,
                committed,
                total,
                ..
            })) => {
                assert_eq!(step, "functions");
                assert_eq!(committed, 2);
                assert_eq!(total, 5);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stepwise_failure_on_first_step_is_not_partial() {
        let mut client = MockRemoteClient::new();
        client
            .expect_query()
            .returning(|_| Err(RemoteError::network("reset").into()));
        let backend = LegacyBackend::new();

        let result = PlanExecutor::new(&client, &backend).execute(&sample_plan()).await;
        assert!(result.is_err_and(|e| e.is_transport()));
    }
}
