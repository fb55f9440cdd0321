//! Roster hierarchy reconciliation core.
//! This crate is the single source of truth for the unit ancestry invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use config::{ConfigError, ReconcileConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::unit::{Unit, UnitId, UnitType, UnitValidationError};
pub use reconcile::applicator::{
    partition, ApplyError, ApplyMode, ApplyOutcome, BatchApplicator, ChunkProgress,
};
pub use reconcile::planner::{plan_corrections, Anomaly, Correction, Plan};
pub use reconcile::resolver::{AncestryResolver, Resolution};
pub use reconcile::snapshot::HierarchySnapshot;
pub use repo::unit_store::{
    display_ancestry, AncestryUpdate, SqliteUnitStore, StoreError, StoreResult, UnitStore,
    STORE_WRITE_GROUP_LIMIT,
};
pub use service::reconcile_service::{ReconcileError, ReconcileReport, ReconcileService};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
