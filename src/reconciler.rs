//! Reconciler for converging the remote catalog on the declared schema.
//!
//! This module runs the full pipeline: tag desired objects, observe owned
//! objects, diff, sweep orphans, plan, then either execute the plan or
//! describe it without touching the catalog.

use tracing::{debug, info};

use crate::backend::{Backend, backend_for};
use crate::catalog::{CatalogObserver, DesiredObject, ObjectKind, OutcomeAction, RemoteClient};
use crate::config::{CatalogConfig, ConfigHasher, Generation};
use crate::error::Result;
use crate::planner::{
    DependencyRules, DiffEngine, MetadataTagger, OperationKind, OrphanSweep, Plan, PlanExecutor,
    Planner, RuntimeDefaults,
};
use crate::report::{Logger, Report, ReportEntry, RunMode};

/// Options for a deploy or remove run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeployOptions {
    /// Compute and report changes without submitting them.
    pub preview: bool,
    /// Like `preview`, and also report the rendered statements.
    pub dry_run: bool,
}

impl DeployOptions {
    /// Returns the run mode these options select.
    #[must_use]
    pub const fn mode(self) -> RunMode {
        if self.dry_run {
            RunMode::DryRun
        } else if self.preview {
            RunMode::Preview
        } else {
            RunMode::Apply
        }
    }
}

/// Reconciler for a catalog configuration.
pub struct Reconciler<'a> {
    /// Configuration.
    config: &'a CatalogConfig,
    /// Catalog connection.
    client: &'a dyn RemoteClient,
    /// Line sink for reports and errors.
    logger: &'a dyn Logger,
    /// Metadata tagger.
    tagger: MetadataTagger,
    /// Diff engine.
    diff_engine: DiffEngine,
    /// Content hasher.
    hasher: ConfigHasher,
    /// Dependency-ordering planner.
    planner: Planner,
}

/// Kinds a generation manages.
const fn managed_kinds(generation: Generation) -> &'static [ObjectKind] {
    match generation {
        Generation::Current => &[ObjectKind::Collection, ObjectKind::Role, ObjectKind::Function],
        Generation::Legacy => &ObjectKind::ALL,
    }
}

impl<'a> Reconciler<'a> {
    /// Creates a new reconciler.
    #[must_use]
    pub fn new(config: &'a CatalogConfig, client: &'a dyn RemoteClient, logger: &'a dyn Logger) -> Self {
        Self {
            config,
            client,
            logger,
            tagger: MetadataTagger::new(),
            diff_engine: DiffEngine::new(),
            hasher: ConfigHasher::new(),
            planner: Planner::default(),
        }
    }

    /// Replaces the default dependency rules.
    #[must_use]
    pub fn with_rules(mut self, rules: DependencyRules) -> Self {
        self.planner = Planner::new(rules);
        self
    }

    /// Converges the catalog on the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if observation, planning or execution fails. The
    /// error is also logged.
    pub async fn deploy(&self, options: DeployOptions) -> Result<Report> {
        self.run(options, false).await
    }

    /// Deletes every owned object whose retention policy allows it.
    ///
    /// # Errors
    ///
    /// Returns an error if observation or execution fails. The error is also
    /// logged.
    pub async fn remove(&self, options: DeployOptions) -> Result<Report> {
        self.run(options, true).await
    }

    async fn run(&self, options: DeployOptions, remove: bool) -> Result<Report> {
        let mode = options.mode();
        match self.reconcile(mode, remove).await {
            Ok(report) => {
                report.log_to(self.logger);
                Ok(report)
            }
            Err(e) => {
                let message = match mode.prefix() {
                    Some(prefix) => format!("{prefix} {e}"),
                    None => e.to_string(),
                };
                self.logger.error(&message);
                Err(e)
            }
        }
    }

    /// Builds the plan for this configuration without executing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is inconsistent or observation
    /// fails.
    pub async fn plan(&self, remove: bool) -> Result<(Plan, Box<dyn Backend>)> {
        let (generation, section) = self.config.active_section()?;
        let backend = backend_for(generation);
        let defaults = RuntimeDefaults::new(generation, section.retention_policy);

        let declared = if remove {
            Vec::new()
        } else {
            section.desired_objects()?
        };
        let desired = self
            .tagger
            .tag_all(declared, &defaults)
            .into_iter()
            .map(|object| backend.normalize(object))
            .collect::<Result<Vec<DesiredObject>>>()?;

        let fingerprint = self
            .hasher
            .short_hash(&self.hasher.hash_objects(generation, &desired));
        info!(
            "Planning {generation} catalog ({} desired objects, fingerprint {fingerprint})",
            desired.len()
        );

        let observed = CatalogObserver::new(self.client, self.config.connection.concurrency)
            .fetch_owned(managed_kinds(generation), generation.owner_tag())
            .await?;

        let stored = desired
            .iter()
            .map(|object| backend.stored_form(object))
            .collect::<Result<Vec<_>>>()?;
        let diff = self.diff_engine.compute_stored(&desired, &stored, &observed);
        let deletions = OrphanSweep::new(generation.owner_tag()).sweep(&desired, &observed);
        let plan = self.planner.plan(&diff, deletions, fingerprint);

        debug!("{plan}");
        Ok((plan, backend))
    }

    async fn reconcile(&self, mode: RunMode, remove: bool) -> Result<Report> {
        let (plan, backend) = self.plan(remove).await?;
        let executor = PlanExecutor::new(self.client, backend.as_ref());
        let mut report = Report::new(backend.generation(), mode, plan.fingerprint.clone());

        if mode == RunMode::DryRun {
            for batch in executor.batches(&plan)? {
                if let Some(step) = batch.step {
                    self.logger.info(&format!("[dry-run] step {step}"));
                }
                for statement in &batch.transaction.statements {
                    self.logger.info(&format!("[dry-run] {statement}"));
                }
            }
        }

        if mode.is_read_only() {
            report.entries = plan
                .operations
                .iter()
                .filter(|op| !op.follow_up)
                .map(|op| ReportEntry {
                    kind: op.object_kind,
                    name: op.name.clone(),
                    action: match op.kind {
                        OperationKind::Create => OutcomeAction::Created,
                        OperationKind::Update => OutcomeAction::Updated,
                        OperationKind::Delete => OutcomeAction::Deleted,
                    },
                    field_diffs: op.field_diffs.clone(),
                })
                .collect();
            return Ok(report);
        }

        if plan.is_empty() {
            return Ok(report);
        }

        let outcomes = executor.execute(&plan).await?;
        report.entries = outcomes
            .into_iter()
            .filter(|outcome| !outcome.operation.follow_up && outcome.action != OutcomeAction::NoOp)
            .map(|outcome| ReportEntry {
                kind: outcome.operation.object_kind,
                name: outcome.operation.name,
                action: outcome.action,
                field_diffs: outcome.operation.field_diffs,
            })
            .collect();

        info!(
            "Applied: {} created, {} updated, {} deleted",
            report.count(OutcomeAction::Created),
            report.count(OutcomeAction::Updated),
            report.count(OutcomeAction::Deleted)
        );
        Ok(report)
    }
}
