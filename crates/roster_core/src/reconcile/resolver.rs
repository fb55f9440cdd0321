//! Ancestor resolver.
//!
//! # Responsibility
//! - Find the nearest distinguished-type ancestor of a unit by walking
//!   `parent_id` links through a snapshot.
//! - Classify walks that end without one (root reached, dangling parent,
//!   cycle) so callers can report data-quality problems.
//!
//! # Invariants
//! - A distinguished-type unit resolves to its own id.
//! - Every walk keeps its own visited set and terminates after at most
//!   `snapshot.len()` steps.
//! - For a fixed snapshot, resolution is a pure function of the unit id.

use crate::model::unit::{UnitId, UnitType};
use crate::reconcile::snapshot::HierarchySnapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How a resolution walk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// The unit is itself of the distinguished type.
    Own { id: UnitId },
    /// A strict ancestor of the distinguished type was found.
    Ancestor { id: UnitId },
    /// The chain ended at a parentless unit of another type.
    NoAncestor,
    /// A `parent_id` points outside the snapshot.
    MissingParent { missing: UnitId },
    /// The walk came back to an id it had already visited.
    Cycle { repeated: UnitId },
    /// The starting id is not in the snapshot.
    UnknownUnit,
}

impl Resolution {
    /// Ancestry value this resolution implies.
    pub fn ancestry_id(&self) -> Option<&str> {
        match self {
            Self::Own { id } | Self::Ancestor { id } => Some(id.as_str()),
            _ => None,
        }
    }

    /// Whether the walk was cut short by malformed parent data.
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Self::MissingParent { .. } | Self::Cycle { .. })
    }

    /// Short label used in reports and log lines.
    pub fn label(&self) -> String {
        match self {
            Self::Own { .. } => "own".to_string(),
            Self::Ancestor { .. } => "ancestor".to_string(),
            Self::NoAncestor => "no_ancestor".to_string(),
            Self::MissingParent { missing } => format!("dangling_parent:{missing}"),
            Self::Cycle { repeated } => format!("cycle_at:{repeated}"),
            Self::UnknownUnit => "unknown_unit".to_string(),
        }
    }
}

/// Resolves ancestry against one snapshot.
#[derive(Debug, Clone, Copy)]
pub struct AncestryResolver<'a> {
    snapshot: &'a HierarchySnapshot,
    distinguished: UnitType,
}

impl<'a> AncestryResolver<'a> {
    pub fn new(snapshot: &'a HierarchySnapshot, distinguished: UnitType) -> Self {
        Self {
            snapshot,
            distinguished,
        }
    }

    pub fn snapshot(&self) -> &'a HierarchySnapshot {
        self.snapshot
    }

    pub fn distinguished(&self) -> UnitType {
        self.distinguished
    }

    /// Returns the expected ancestry id for `unit_id`, or `None` when no
    /// distinguished-type ancestor is reachable.
    pub fn resolve(&self, unit_id: &str) -> Option<UnitId> {
        self.resolve_detailed(unit_id)
            .ancestry_id()
            .map(str::to_string)
    }

    /// Walks upward from `unit_id` and reports how the walk ended.
    pub fn resolve_detailed(&self, unit_id: &str) -> Resolution {
        let Some(start) = self.snapshot.get(unit_id) else {
            return Resolution::UnknownUnit;
        };
        if start.unit_type == self.distinguished {
            return Resolution::Own {
                id: start.id.clone(),
            };
        }

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(start.id.as_str());
        let mut cursor = start.parent_id.as_deref();

        while let Some(current) = cursor {
            if !visited.insert(current) {
                return Resolution::Cycle {
                    repeated: current.to_string(),
                };
            }
            let Some(node) = self.snapshot.get(current) else {
                return Resolution::MissingParent {
                    missing: current.to_string(),
                };
            };
            if node.unit_type == self.distinguished {
                return Resolution::Ancestor {
                    id: node.id.clone(),
                };
            }
            cursor = node.parent_id.as_deref();
        }

        Resolution::NoAncestor
    }
}
