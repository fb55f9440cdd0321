//! Ancestry reconciliation use-case service.
//!
//! # Responsibility
//! - Run one point-in-time reconciliation pass: load, snapshot, resolve,
//!   plan, apply.
//! - Translate stage failures into the run-level error taxonomy.
//!
//! # Invariants
//! - The store is read exactly once per run, before any write.
//! - A load failure happens before any write can have occurred.
//! - Only one pass is assumed to run against a collection at a time.

use crate::config::{ConfigError, ReconcileConfig};
use crate::reconcile::applicator::{
    ApplyError, ApplyMode, ApplyOutcome, BatchApplicator, ChunkProgress,
};
use crate::reconcile::planner::{plan_corrections, Anomaly, Correction, Plan};
use crate::reconcile::resolver::AncestryResolver;
use crate::reconcile::snapshot::HierarchySnapshot;
use crate::repo::unit_store::{StoreError, UnitStore};
use log::{error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Errors that end a reconciliation run.
#[derive(Debug)]
pub enum ReconcileError {
    /// Configuration rejected before touching the store.
    Config(ConfigError),
    /// Bulk read failed; nothing was written.
    Load(StoreError),
    /// Write group `chunk_index` failed; earlier groups stay committed.
    Commit {
        chunk_index: usize,
        chunk_count: usize,
        last_committed_chunk: Option<usize>,
        applied: usize,
        source: StoreError,
    },
}

impl ReconcileError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Load(_) => "load",
            Self::Commit { .. } => "commit",
        }
    }
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "invalid configuration: {err}"),
            Self::Load(err) => write!(f, "failed to load units: {err}"),
            Self::Commit {
                chunk_index,
                chunk_count,
                last_committed_chunk,
                applied,
                source,
            } => {
                write!(
                    f,
                    "failed to commit write group {chunk_index}/{chunk_count}: {source}; "
                )?;
                match last_committed_chunk {
                    Some(last) => write!(
                        f,
                        "last committed group {last} ({applied} corrections applied); re-run to finish"
                    ),
                    None => write!(f, "no group was committed; re-run to retry"),
                }
            }
        }
    }
}

impl Error for ReconcileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Load(err) => Some(err),
            Self::Commit { source, .. } => Some(source),
        }
    }
}

impl From<ConfigError> for ReconcileError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ApplyError> for ReconcileError {
    fn from(value: ApplyError) -> Self {
        match value {
            ApplyError::InvalidBatchSize => Self::Config(ConfigError::ZeroBatchSize),
            ApplyError::Commit {
                chunk_index,
                chunk_count,
                last_committed_chunk,
                applied,
                source,
            } => Self::Commit {
                chunk_index,
                chunk_count,
                last_committed_chunk,
                applied,
                source,
            },
        }
    }
}

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub collection: String,
    pub mode: ApplyMode,
    /// Units read by the bulk load.
    pub loaded: usize,
    /// Write group size used for this run.
    pub batch_size: usize,
    pub corrections: Vec<Correction>,
    pub anomalies: Vec<Anomaly>,
    pub outcome: ApplyOutcome,
}

/// Reconciliation service facade.
pub struct ReconcileService<S: UnitStore> {
    store: S,
    config: ReconcileConfig,
}

impl<S: UnitStore> ReconcileService<S> {
    /// Creates a service after validating `config`.
    pub fn new(store: S, config: ReconcileConfig) -> Result<Self, ReconcileError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Write group size after applying the store's own limit.
    pub fn batch_size(&self) -> usize {
        self.config.effective_batch_size(self.store.max_batch_size())
    }

    /// Loads the collection and plans corrections without writing.
    ///
    /// Returns the number of records the bulk read produced alongside the
    /// plan; duplicate ids dropped by the snapshot are still counted.
    pub fn plan(&self) -> Result<(usize, Plan), ReconcileError> {
        let started_at = Instant::now();
        let collection = self.config.collection.as_str();
        let units = self.store.list_all(collection).map_err(|err| {
            error!(
                "event=units_load module=service status=error collection={} duration_ms={} error={}",
                collection,
                started_at.elapsed().as_millis(),
                err
            );
            ReconcileError::Load(err)
        })?;
        info!(
            "event=units_load module=service status=ok collection={} units={} duration_ms={}",
            collection,
            units.len(),
            started_at.elapsed().as_millis()
        );

        let loaded = units.len();
        let snapshot = HierarchySnapshot::build(units);
        let resolver = AncestryResolver::new(&snapshot, self.config.distinguished_type);
        let plan = plan_corrections(&resolver);
        info!(
            "event=plan module=service status=ok loaded={} units={} corrections={} anomalies={}",
            loaded,
            snapshot.len(),
            plan.corrections.len(),
            plan.anomalies.len()
        );

        Ok((loaded, plan))
    }

    /// Runs one full pass in `mode`, calling `on_progress` after every
    /// committed write group.
    pub fn run(
        &self,
        mode: ApplyMode,
        on_progress: impl FnMut(&ChunkProgress),
    ) -> Result<ReconcileReport, ReconcileError> {
        let started_at = Instant::now();
        info!(
            "event=reconcile_run module=service status=start collection={} mode={}",
            self.config.collection,
            mode.as_str()
        );

        let result = self.run_inner(mode, on_progress);
        match &result {
            Ok(report) => info!(
                "event=reconcile_run module=service status=ok mode={} loaded={} corrections={} anomalies={} duration_ms={}",
                mode.as_str(),
                report.loaded,
                report.corrections.len(),
                report.anomalies.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=reconcile_run module=service status=error mode={} stage={} duration_ms={} error={}",
                mode.as_str(),
                err.stage(),
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }

    fn run_inner(
        &self,
        mode: ApplyMode,
        on_progress: impl FnMut(&ChunkProgress),
    ) -> Result<ReconcileReport, ReconcileError> {
        let (loaded, plan) = self.plan()?;
        let outcome = self.apply(&plan, mode, on_progress)?;

        Ok(ReconcileReport {
            collection: self.config.collection.clone(),
            mode,
            loaded,
            batch_size: self.batch_size(),
            corrections: plan.corrections,
            anomalies: plan.anomalies,
            outcome,
        })
    }

    /// Applies a plan produced by [`ReconcileService::plan`].
    ///
    /// Callers that print the plan before writing use `plan` + `apply`
    /// instead of `run`.
    pub fn apply(
        &self,
        plan: &Plan,
        mode: ApplyMode,
        on_progress: impl FnMut(&ChunkProgress),
    ) -> Result<ApplyOutcome, ReconcileError> {
        let applicator = BatchApplicator::new(
            &self.store,
            self.config.collection.as_str(),
            self.batch_size(),
        )?;
        Ok(applicator.apply(&plan.corrections, mode, on_progress)?)
    }
}
