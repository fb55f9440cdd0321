//! Reconciliation run configuration.
//!
//! # Responsibility
//! - Hold the knobs of one reconciliation pass with safe defaults.
//! - Reject configurations that could not produce a valid run.
//!
//! # Invariants
//! - A validated collection name is a plain identifier and is safe to use as
//!   a SQL table name.

use crate::model::unit::UnitType;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub const DEFAULT_COLLECTION: &str = "units";
pub const DEFAULT_MAX_BATCH_SIZE: usize = 500;

static COLLECTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid collection name regex"));

/// Returns whether `value` is usable as a collection name.
pub fn is_valid_collection_name(value: &str) -> bool {
    COLLECTION_NAME_RE.is_match(value)
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidCollection(String),
    ZeroBatchSize,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCollection(name) => write!(
                f,
                "collection name `{name}` must match [A-Za-z_][A-Za-z0-9_]*"
            ),
            Self::ZeroBatchSize => write!(f, "batch size must be at least 1"),
        }
    }
}

impl Error for ConfigError {}

/// Settings for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Collection holding the unit records.
    pub collection: String,
    /// Unit type whose id every other unit's ancestry resolves to.
    pub distinguished_type: UnitType,
    /// Requested upper bound on updates per write group. The store's own
    /// limit still applies when it is lower.
    pub max_batch_size: usize,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            distinguished_type: UnitType::Battalion,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl ReconcileConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_collection_name(&self.collection) {
            return Err(ConfigError::InvalidCollection(self.collection.clone()));
        }
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }

    /// Batch size actually used against a store advertising `store_limit`.
    pub fn effective_batch_size(&self, store_limit: usize) -> usize {
        self.max_batch_size.min(store_limit).max(1)
    }
}
