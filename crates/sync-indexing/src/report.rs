//! Results of batch entry points.

use serde::Serialize;

use sync_types::EntityId;

use crate::converter::{BatchConversion, ConversionFailure};

/// Result of one batch write.
#[derive(Debug, Default, Clone, Serialize)]
pub struct BatchReport {
    /// Documents written to the backend
    pub written: usize,
    /// Documents deleted from the backend
    pub deleted: usize,
    /// Entities that converted to no document
    pub skipped: usize,
    /// Entities whose conversion failed
    pub failed: Vec<EntityId>,
    /// Whether a commit followed the write
    pub committed: bool,
}

impl BatchReport {
    /// Create a new empty report.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report for a converted batch about to be written.
    pub fn from_conversion(batch: &BatchConversion) -> Self {
        Self {
            written: batch.documents.len(),
            skipped: batch.skipped,
            failed: batch.failures.iter().map(|f: &ConversionFailure| f.id).collect(),
            ..Self::default()
        }
    }

    /// Merge another report into this one.
    pub fn merge(&mut self, other: &BatchReport) {
        self.written += other.written;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed.extend(other.failed.iter().copied());
        self.committed |= other.committed;
    }

    /// Whether anything reached the backend.
    pub fn has_updates(&self) -> bool {
        self.written > 0 || self.deleted > 0
    }

    /// Total number of entities handled.
    pub fn total(&self) -> usize {
        self.written + self.deleted + self.skipped + self.failed.len()
    }
}

/// Result of an aggregate add-or-update.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateStatus {
    /// Nothing to do: no payload, or indexed recently and unchanged
    Skipped,
    /// All child documents rewritten
    Reindexed(BatchReport),
}
