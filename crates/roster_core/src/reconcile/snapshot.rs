//! Hierarchy graph builder.
//!
//! # Responsibility
//! - Index a bulk read of units by id for O(1) parent lookups.
//!
//! # Invariants
//! - Load order is preserved and drives every downstream ordering.
//! - No validation happens here; dangling and cyclic `parent_id` values pass
//!   through untouched.

use crate::model::unit::Unit;
use log::{debug, warn};
use std::collections::HashMap;

/// Immutable in-memory view of one collection at a point in time.
#[derive(Debug, Clone, Default)]
pub struct HierarchySnapshot {
    units: Vec<Unit>,
    index: HashMap<String, usize>,
}

impl HierarchySnapshot {
    /// Builds the id index over `units`.
    ///
    /// The store guarantees unique ids; if a duplicate slips through, the
    /// first occurrence is kept and later ones are dropped.
    pub fn build(loaded: Vec<Unit>) -> Self {
        let mut index = HashMap::with_capacity(loaded.len());
        let mut units = Vec::with_capacity(loaded.len());
        let mut duplicates = 0usize;
        for unit in loaded {
            if index.contains_key(unit.id.as_str()) {
                duplicates += 1;
                continue;
            }
            index.insert(unit.id.clone(), units.len());
            units.push(unit);
        }

        if duplicates > 0 {
            warn!(
                "event=snapshot_build module=reconcile status=warn duplicate_ids={}",
                duplicates
            );
        }
        debug!(
            "event=snapshot_build module=reconcile status=ok units={}",
            units.len()
        );

        Self { units, index }
    }

    /// Looks up one unit by id.
    pub fn get(&self, id: &str) -> Option<&Unit> {
        self.index.get(id).map(|position| &self.units[*position])
    }

    /// Units in load order.
    pub fn units(&self) -> &[Unit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}
