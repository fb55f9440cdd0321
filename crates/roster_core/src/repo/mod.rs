//! Document store adapter contracts and persistence implementations.
//!
//! # Responsibility
//! - Define the narrow store contract the reconciler depends on.
//! - Isolate SQLite query details from reconciliation logic.
//!
//! # Invariants
//! - Store writes touch only `ancestry_id` and `updated_at`.
//! - Store APIs return semantic errors (`UnitNotFound`, `ConditionFailed`)
//!   in addition to DB transport errors.

pub mod unit_store;
