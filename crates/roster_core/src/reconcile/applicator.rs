//! Batch applicator.
//!
//! # Responsibility
//! - Split planned corrections into write groups no larger than the batch
//!   size and commit them one at a time.
//! - Support a dry-run mode that performs no writes.
//!
//! # Invariants
//! - Groups are committed strictly in order; a failed group stops the run and
//!   leaves every earlier group committed and every later group untouched.
//! - No retries. Re-planning from current store state is the recovery path.

use crate::reconcile::planner::Correction;
use crate::repo::unit_store::{AncestryUpdate, StoreError, UnitStore};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

/// Whether an apply pass may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyMode {
    DryRun,
    Live,
}

impl ApplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRun => "dry_run",
            Self::Live => "live",
        }
    }
}

/// Progress reported after each committed write group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    /// 1-based index of the committed group.
    pub chunk_index: usize,
    pub chunk_count: usize,
    /// Updates in this group.
    pub chunk_len: usize,
    /// Updates committed so far, this group included.
    pub applied: usize,
    pub total: usize,
}

/// Terminal state of a successful apply pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyOutcome {
    /// Nothing was written; `planned` corrections were reported.
    DryRun { planned: usize },
    /// Live mode with an empty plan.
    NothingToDo,
    /// Every group committed.
    Applied { chunks: usize, applied: usize },
}

/// Errors from an apply pass.
#[derive(Debug)]
pub enum ApplyError {
    /// Batch size of zero cannot make progress.
    InvalidBatchSize,
    /// Group `chunk_index` failed; groups before it stay committed.
    Commit {
        chunk_index: usize,
        chunk_count: usize,
        last_committed_chunk: Option<usize>,
        applied: usize,
        source: StoreError,
    },
}

impl Display for ApplyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidBatchSize => write!(f, "batch size must be at least 1"),
            Self::Commit {
                chunk_index,
                chunk_count,
                last_committed_chunk,
                applied,
                source,
            } => {
                write!(
                    f,
                    "write group {chunk_index}/{chunk_count} failed: {source}; "
                )?;
                match last_committed_chunk {
                    Some(last) => write!(
                        f,
                        "last committed group {last} ({applied} corrections applied)"
                    ),
                    None => write!(f, "no group was committed"),
                }
            }
        }
    }
}

impl Error for ApplyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidBatchSize => None,
            Self::Commit { source, .. } => Some(source),
        }
    }
}

/// Splits corrections into consecutive groups of at most `batch_size`.
///
/// Returns no groups for a zero batch size.
pub fn partition(corrections: &[Correction], batch_size: usize) -> Vec<&[Correction]> {
    if batch_size == 0 {
        return Vec::new();
    }
    corrections.chunks(batch_size).collect()
}

/// Commits planned corrections against one store collection.
pub struct BatchApplicator<'s, S: UnitStore + ?Sized> {
    store: &'s S,
    collection: &'s str,
    batch_size: usize,
}

impl<'s, S: UnitStore + ?Sized> BatchApplicator<'s, S> {
    pub fn new(store: &'s S, collection: &'s str, batch_size: usize) -> Result<Self, ApplyError> {
        if batch_size == 0 {
            return Err(ApplyError::InvalidBatchSize);
        }
        Ok(Self {
            store,
            collection,
            batch_size,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Applies `corrections` in `mode`, calling `on_progress` after every
    /// committed group.
    pub fn apply(
        &self,
        corrections: &[Correction],
        mode: ApplyMode,
        mut on_progress: impl FnMut(&ChunkProgress),
    ) -> Result<ApplyOutcome, ApplyError> {
        if mode == ApplyMode::DryRun {
            info!(
                "event=apply module=reconcile status=ok mode=dry_run planned={}",
                corrections.len()
            );
            return Ok(ApplyOutcome::DryRun {
                planned: corrections.len(),
            });
        }
        if corrections.is_empty() {
            info!("event=apply module=reconcile status=ok mode=live planned=0");
            return Ok(ApplyOutcome::NothingToDo);
        }

        let chunks = partition(corrections, self.batch_size);
        let chunk_count = chunks.len();
        let total = corrections.len();
        let mut applied = 0usize;

        for (position, chunk) in chunks.into_iter().enumerate() {
            let chunk_index = position + 1;
            let started_at = Instant::now();
            let updates: Vec<AncestryUpdate> = chunk.iter().map(Correction::to_update).collect();

            if let Err(source) = self
                .store
                .commit_batch(self.collection, &updates, self.batch_size)
            {
                error!(
                    "event=chunk_commit module=reconcile status=error chunk={}/{} size={} applied={} duration_ms={} error={}",
                    chunk_index,
                    chunk_count,
                    chunk.len(),
                    applied,
                    started_at.elapsed().as_millis(),
                    source
                );
                return Err(ApplyError::Commit {
                    chunk_index,
                    chunk_count,
                    last_committed_chunk: (position > 0).then_some(position),
                    applied,
                    source,
                });
            }

            applied += chunk.len();
            info!(
                "event=chunk_commit module=reconcile status=ok chunk={}/{} size={} applied={} duration_ms={}",
                chunk_index,
                chunk_count,
                chunk.len(),
                applied,
                started_at.elapsed().as_millis()
            );
            on_progress(&ChunkProgress {
                chunk_index,
                chunk_count,
                chunk_len: chunk.len(),
                applied,
                total,
            });
        }

        Ok(ApplyOutcome::Applied {
            chunks: chunk_count,
            applied,
        })
    }
}
