//! Diff planner.
//!
//! # Responsibility
//! - Compare each unit's stored ancestry with its resolved ancestry.
//! - Emit one correction per disagreeing unit and collect data-quality
//!   anomalies along the way.
//!
//! # Invariants
//! - Corrections follow snapshot load order.
//! - A missing stored value and a resolved `None` compare equal.
//! - Planning never writes.

use crate::model::unit::{UnitId, UnitType};
use crate::reconcile::resolver::{AncestryResolver, Resolution};
use crate::repo::unit_store::{display_ancestry, AncestryUpdate};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// One unit whose stored ancestry disagrees with the resolved value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub id: UnitId,
    pub unit_type: UnitType,
    pub name: String,
    /// Stored ancestry at snapshot time.
    pub from: Option<UnitId>,
    /// Resolved ancestry to write.
    pub to: Option<UnitId>,
    /// How the resolver arrived at `to`.
    pub resolution: Resolution,
}

impl Correction {
    /// Conditional store update for this correction.
    pub fn to_update(&self) -> AncestryUpdate {
        AncestryUpdate {
            id: self.id.clone(),
            expected: self.from.clone(),
            ancestry_id: self.to.clone(),
        }
    }
}

/// A unit whose resolution walk hit malformed parent data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Anomaly {
    pub id: UnitId,
    pub name: String,
    pub resolution: Resolution,
}

/// Output of one planning pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub corrections: Vec<Correction>,
    /// Cycles and dangling parents, reported whether or not the unit also
    /// needs a correction.
    pub anomalies: Vec<Anomaly>,
}

/// Plans corrections for every unit in the resolver's snapshot.
pub fn plan_corrections(resolver: &AncestryResolver<'_>) -> Plan {
    let mut plan = Plan::default();

    for unit in resolver.snapshot().units() {
        let resolution = resolver.resolve_detailed(&unit.id);

        if resolution.is_anomaly() {
            warn!(
                "event=resolve_anomaly module=reconcile status=warn unit_id={} anomaly={}",
                unit.id,
                resolution.label()
            );
            plan.anomalies.push(Anomaly {
                id: unit.id.clone(),
                name: unit.name.clone(),
                resolution: resolution.clone(),
            });
        }

        let expected = resolution.ancestry_id().map(str::to_string);
        if expected == unit.ancestry_id {
            continue;
        }

        debug!(
            "event=plan module=reconcile status=diff unit_id={} from={} to={}",
            unit.id,
            display_ancestry(unit.ancestry_id.as_deref()),
            display_ancestry(expected.as_deref())
        );
        plan.corrections.push(Correction {
            id: unit.id.clone(),
            unit_type: unit.unit_type,
            name: unit.name.clone(),
            from: unit.ancestry_id.clone(),
            to: expected,
            resolution,
        });
    }

    plan
}
