//! Ingestion progress records
//!
//! Provides the durable ingestion checkpoint and the summary returned by the
//! administrative ingestion operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

use super::document::Category;

/// Durable marker of ingestion progress within one phase.
///
/// While a checkpoint exists, `last_completed_index < total_count` and the
/// store may be missing items of `phase` beyond that index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionCheckpoint {
    pub phase: Category,
    pub last_completed_index: usize,
    pub total_count: usize,
    /// Items processed in this run across all phases
    pub total_items_processed: usize,
    pub timestamp: DateTime<Utc>,
}

impl IngestionCheckpoint {
    pub fn new(
        phase: Category,
        last_completed_index: usize,
        total_count: usize,
        total_items_processed: usize,
    ) -> Self {
        Self {
            phase,
            last_completed_index,
            total_count,
            total_items_processed,
            timestamp: Utc::now(),
        }
    }

    /// First source index still to be ingested in `phase`
    pub fn resume_index(&self) -> usize {
        self.last_completed_index + 1
    }

    /// Whether the invariant holds for this record
    pub fn is_consistent(&self) -> bool {
        self.last_completed_index < self.total_count
    }
}

/// Save a checkpoint to disk atomically (write temp file, then rename).
pub fn save_to_disk(cp: &IngestionCheckpoint, path: &Path) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(cp)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a checkpoint from disk. `Ok(None)` when no checkpoint exists.
pub fn load_from_disk(path: &Path) -> io::Result<Option<IngestionCheckpoint>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e),
    };
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Remove the checkpoint file if present.
pub fn remove_from_disk(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Outcome of an administrative ingestion operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Items embedded and written (or deleted) by this call
    pub processed: usize,
    /// Items the operation covered
    pub total: usize,
    /// Items still missing afterwards
    pub remaining: usize,
}
