//! Point-in-time index snapshots
//!
//! A snapshot is the full record set serialized as JSON and zstd-compressed,
//! written atomically (temp file, then rename). Taken before every
//! destructive bulk operation and restored if that operation fails.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tracing::{info, warn};

use super::vector_store::{StoreError, StoredRecord, VectorStore};
use crate::config::defaults::BACKUP_ZSTD_LEVEL;

#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    created_at: DateTime<Utc>,
    dimension: usize,
    records: Vec<StoredRecord>,
}

/// Summary of a snapshot on disk
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotInfo {
    pub created_at: DateTime<Utc>,
    pub records: usize,
}

/// Write the current content of `store` to `path`. Returns the record count.
pub fn write_snapshot(store: &VectorStore, path: &Path) -> Result<usize, StoreError> {
    let snapshot = IndexSnapshot {
        created_at: Utc::now(),
        dimension: store.dimension(),
        records: store.export(),
    };
    let count = snapshot.records.len();

    let json = serde_json::to_vec(&snapshot)?;
    let compressed = zstd::encode_all(json.as_slice(), BACKUP_ZSTD_LEVEL)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("zstd encode error: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("zst.tmp");
    std::fs::write(&tmp_path, compressed)?;
    std::fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), records = count, "Index snapshot written");
    Ok(count)
}

fn read_snapshot(path: &Path) -> Result<IndexSnapshot, StoreError> {
    let compressed = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(StoreError::BackupMissing(path.to_path_buf()))
        }
        Err(e) => return Err(e.into()),
    };
    let json = zstd::decode_all(compressed.as_slice()).map_err(|e| {
        io::Error::new(io::ErrorKind::InvalidData, format!("zstd decode error: {e}"))
    })?;
    Ok(serde_json::from_slice(&json)?)
}

/// Replace the content of `store` with the snapshot at `path`.
///
/// The index takes the snapshot's dimension, so a snapshot taken before an
/// embedding model change brings the old index back intact.
pub fn restore_snapshot(store: &VectorStore, path: &Path) -> Result<usize, StoreError> {
    let snapshot = read_snapshot(path)?;
    if snapshot.dimension != store.dimension() {
        warn!(
            index = store.dimension(),
            snapshot = snapshot.dimension,
            "Restoring snapshot with a different dimension"
        );
    }
    let count = store.replace_all_at(snapshot.dimension, snapshot.records)?;
    info!(
        path = %path.display(),
        records = count,
        taken_at = %snapshot.created_at,
        "Index restored from snapshot"
    );
    Ok(count)
}

/// Metadata of the snapshot at `path`, if one exists
pub fn snapshot_info(path: &Path) -> Result<Option<SnapshotInfo>, StoreError> {
    match read_snapshot(path) {
        Ok(s) => Ok(Some(SnapshotInfo {
            created_at: s.created_at,
            records: s.records.len(),
        })),
        Err(StoreError::BackupMissing(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Document, DocumentDetail, IncidentDetail};
    use std::collections::BTreeSet;

    fn doc(id: &str) -> Document {
        Document {
            id: id.to_string(),
            title: id.to_string(),
            body: String::new(),
            tags: BTreeSet::new(),
            risk_keywords: String::new(),
            detail: DocumentDetail::Incident(IncidentDetail::default()),
        }
    }

    #[test]
    fn test_snapshot_restores_prior_state() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path().join("index"), 2).unwrap();
        let backup = tmp.path().join("backup/index_snapshot.json.zst");

        store.upsert(doc("keep"), vec![1.0, 0.0]).unwrap();
        assert_eq!(write_snapshot(&store, &backup).unwrap(), 1);
        assert!(!backup.with_extension("zst.tmp").exists());

        store.delete_where(|_| true).unwrap();
        store.upsert(doc("stray"), vec![0.0, 1.0]).unwrap();

        assert_eq!(restore_snapshot(&store, &backup).unwrap(), 1);
        assert!(store.contains("keep"));
        assert!(!store.contains("stray"));
        assert_eq!(store.count_by_category()[&Category::Incident], 1);
    }

    #[test]
    fn test_restore_brings_back_snapshot_dimension() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path().join("index"), 2).unwrap();
        let backup = tmp.path().join("backup/index_snapshot.json.zst");

        store.upsert(doc("old"), vec![1.0, 0.0]).unwrap();
        write_snapshot(&store, &backup).unwrap();

        store.replace_all_at(3, Vec::new()).unwrap();
        store.upsert(doc("new"), vec![0.0, 0.0, 1.0]).unwrap();

        assert_eq!(restore_snapshot(&store, &backup).unwrap(), 1);
        assert_eq!(store.dimension(), 2);
        assert!(store.contains("old"));
        assert!(!store.contains("new"));
    }

    #[test]
    fn test_missing_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path().join("index"), 2).unwrap();
        let path = tmp.path().join("none.zst");
        assert!(matches!(
            restore_snapshot(&store, &path),
            Err(StoreError::BackupMissing(_))
        ));
        assert!(snapshot_info(&path).unwrap().is_none());
    }

    #[test]
    fn test_snapshot_info() {
        let tmp = tempfile::tempdir().unwrap();
        let store = VectorStore::open(tmp.path().join("index"), 2).unwrap();
        store.upsert(doc("a"), vec![1.0, 0.0]).unwrap();
        let path = tmp.path().join("snap.json.zst");
        write_snapshot(&store, &path).unwrap();
        let info = snapshot_info(&path).unwrap().unwrap();
        assert_eq!(info.records, 1);
    }
}
