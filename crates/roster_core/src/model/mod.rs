//! Roster hierarchy domain model.
//!
//! # Responsibility
//! - Define the unit record shared by the store adapter and the reconciler.
//!
//! # Invariants
//! - Every unit is identified by a stable, store-assigned `UnitId`.
//! - `ancestry_id` is denormalized data and may be stale until reconciled.

pub mod unit;
