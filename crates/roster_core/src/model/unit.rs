//! Unit domain model.
//!
//! # Responsibility
//! - Define the canonical record for one node of the roster hierarchy.
//! - Keep wire naming aligned with the document store (`unitType`,
//!   `parentId`, `ancestryId`, `updatedAt`).
//!
//! # Invariants
//! - `id` is non-blank and never reused for another unit.
//! - `parent_id` is not validated here; dangling and cyclic references are
//!   legal stored data that the resolver must tolerate.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier for a unit, as assigned by the document store.
pub type UnitId = String;

/// Echelon of a unit in the roster hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    /// Top-level unit; the default distinguished type for ancestry.
    Battalion,
    Company,
    Platoon,
    Squad,
}

impl UnitType {
    /// All known unit types in echelon order.
    pub const ALL: [UnitType; 4] = [
        UnitType::Battalion,
        UnitType::Company,
        UnitType::Platoon,
        UnitType::Squad,
    ];

    /// Returns the stored/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Battalion => "battalion",
            Self::Company => "company",
            Self::Platoon => "platoon",
            Self::Squad => "squad",
        }
    }

    /// Parses a stored/wire representation. Case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl Display for UnitType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation errors for unit construction and persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitValidationError {
    /// `id` is empty or whitespace only.
    BlankId,
    /// `name` is empty or whitespace only.
    BlankName,
}

impl Display for UnitValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlankId => write!(f, "unit id must not be blank"),
            Self::BlankName => write!(f, "unit name must not be blank"),
        }
    }
}

impl Error for UnitValidationError {}

/// One node of the roster hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Unit {
    /// Stable store-assigned id.
    pub id: UnitId,
    /// Echelon of this unit.
    pub unit_type: UnitType,
    /// Parent reference. `None` means the unit has no parent.
    pub parent_id: Option<UnitId>,
    /// Denormalized id of the nearest distinguished-type ancestor.
    pub ancestry_id: Option<UnitId>,
    /// Display label. Only used for reporting.
    pub name: String,
    /// Epoch ms of the last store write. `None` until persisted.
    pub updated_at: Option<i64>,
}

impl Unit {
    /// Creates a root-level unit with a freshly generated id.
    pub fn new(unit_type: UnitType, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            unit_type,
            parent_id: None,
            ancestry_id: None,
            name: name.into(),
            updated_at: None,
        }
    }

    /// Creates a unit with a caller-provided id.
    ///
    /// Used by import paths and tests where identity already exists.
    pub fn with_id(
        id: impl Into<String>,
        unit_type: UnitType,
        name: impl Into<String>,
    ) -> Result<Self, UnitValidationError> {
        let mut unit = Self::new(unit_type, name);
        unit.id = id.into();
        unit.validate()?;
        Ok(unit)
    }

    /// Sets the parent reference.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the stored ancestry value.
    pub fn with_ancestry(mut self, ancestry_id: impl Into<String>) -> Self {
        self.ancestry_id = Some(ancestry_id.into());
        self
    }

    /// Checks record-level invariants before persistence.
    pub fn validate(&self) -> Result<(), UnitValidationError> {
        if self.id.trim().is_empty() {
            return Err(UnitValidationError::BlankId);
        }
        if self.name.trim().is_empty() {
            return Err(UnitValidationError::BlankName);
        }
        Ok(())
    }
}
