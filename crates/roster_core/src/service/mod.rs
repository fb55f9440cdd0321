//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store calls and reconciliation stages into runnable passes.
//! - Keep the CLI decoupled from storage and pipeline details.

pub mod reconcile_service;
