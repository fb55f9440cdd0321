//! Ancestry reconciliation pipeline.
//!
//! # Responsibility
//! - Build an immutable hierarchy snapshot from one bulk read.
//! - Resolve every unit's distinguished-type ancestor.
//! - Plan the minimal set of ancestry corrections and apply them in bounded,
//!   sequential write groups.
//!
//! # Invariants
//! - Only the applicator performs store writes; every other stage is a pure
//!   function of the snapshot.
//! - Resolution terminates for any input, including cyclic parent data.

pub mod applicator;
pub mod planner;
pub mod resolver;
pub mod snapshot;
