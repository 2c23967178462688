//! Durable vector index on sled
//!
//! Each record holds a document together with its embedding, keyed by the
//! document id, in one sled value; an embedding never exists without its
//! document. The index records its dimensionality in a meta tree and
//! rejects vectors of any other length.
//!
//! Writers hold a single-writer lock for a whole batch and apply it with one
//! atomic sled batch. After the flush the in-memory snapshot is swapped, so
//! readers never block and only ever see committed batches.

use arc_swap::ArcSwap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::embedding::cosine_similarity;
use crate::types::{Category, Document};

const DOCUMENTS_TREE: &str = "documents";
const META_TREE: &str = "meta";
const DIMENSION_KEY: &[u8] = b"dimension";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Index could not be decoded; `open` heals this by recreating the index
    #[error("index corrupt: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("vector dimension mismatch: index holds {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no backup snapshot at {}", .0.display())]
    BackupMissing(PathBuf),
}

// ============================================================================
// Records
// ============================================================================

/// A document and its embedding, persisted as one value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub document: Document,
    pub vector: Vec<f32>,
}

/// One similarity search result
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub document: Document,
    /// Cosine similarity in [-1, 1]
    pub score: f64,
}

/// Similarity search seam used by the retrieval path.
///
/// Implementations must be thread-safe (Send + Sync); searches run
/// concurrently from several sub-queries.
pub trait VectorSearch: Send + Sync {
    /// Top-`k` neighbours by descending similarity, ties by id.
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError>;
}

type Snapshot = BTreeMap<String, Arc<StoredRecord>>;

// ============================================================================
// Vector Store
// ============================================================================

pub struct VectorStore {
    path: PathBuf,
    db: sled::Db,
    records: sled::Tree,
    meta: sled::Tree,
    dimension: AtomicUsize,
    snapshot: ArcSwap<Snapshot>,
    write_lock: Mutex<()>,
    recovered: bool,
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("path", &self.path)
            .field("dimension", &self.dimension())
            .field("len", &self.len())
            .finish()
    }
}

impl VectorStore {
    /// Open or create the index at `path`.
    ///
    /// A corrupt index (undecodable database or record) is deleted and
    /// recreated empty; `recovered_from_corruption()` then reports true and
    /// ingestion must be re-run.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self, StoreError> {
        let path = path.as_ref();
        match Self::open_inner(path, dimension) {
            Ok(store) => Ok(store),
            Err(StoreError::Corrupt(reason)) => {
                warn!(
                    event = "IndexCorrupt",
                    path = %path.display(),
                    reason = %reason,
                    "Index could not be loaded, recreating it empty; ingestion must be re-run"
                );
                Self::destroy(path)?;
                let mut store = Self::open_inner(path, dimension)?;
                store.recovered = true;
                Ok(store)
            }
            Err(e) => Err(e),
        }
    }

    fn open_inner(path: &Path, dimension: usize) -> Result<Self, StoreError> {
        let had_files = has_entries(path)?;
        let db = sled::open(path).map_err(classify_open_error)?;
        let records = db.open_tree(DOCUMENTS_TREE)?;
        let meta = db.open_tree(META_TREE)?;

        match meta.get(DIMENSION_KEY)? {
            Some(raw) => {
                let bytes: [u8; 8] = raw.as_ref().try_into().map_err(|_| {
                    StoreError::Corrupt("dimension marker has wrong length".to_string())
                })?;
                let stored = u64::from_be_bytes(bytes) as usize;
                if stored != dimension {
                    if !records.is_empty() {
                        return Err(StoreError::DimensionMismatch {
                            expected: stored,
                            actual: dimension,
                        });
                    }
                    meta.insert(DIMENSION_KEY, (dimension as u64).to_be_bytes().to_vec())?;
                }
            }
            None if had_files => {
                return Err(StoreError::Corrupt(
                    "index files present but dimension marker missing".to_string(),
                ));
            }
            None => {
                meta.insert(DIMENSION_KEY, (dimension as u64).to_be_bytes().to_vec())?;
            }
        }

        let mut snapshot = Snapshot::new();
        for item in records.iter() {
            let (key, value) = item.map_err(|e| StoreError::Corrupt(e.to_string()))?;
            let record: StoredRecord = serde_json::from_slice(&value).map_err(|e| {
                StoreError::Corrupt(format!(
                    "record {} undecodable: {e}",
                    String::from_utf8_lossy(&key)
                ))
            })?;
            if record.document.id.as_bytes() != key.as_ref() {
                return Err(StoreError::Corrupt(format!(
                    "record key {} does not match document id {}",
                    String::from_utf8_lossy(&key),
                    record.document.id
                )));
            }
            if record.vector.len() != dimension {
                return Err(StoreError::Corrupt(format!(
                    "record {} has {} dimensions, index holds {dimension}",
                    record.document.id,
                    record.vector.len()
                )));
            }
            snapshot.insert(record.document.id.clone(), Arc::new(record));
        }
        db.flush()?;

        info!(path = %path.display(), records = snapshot.len(), dimension, "Vector index opened");

        Ok(Self {
            path: path.to_path_buf(),
            db,
            records,
            meta,
            dimension: AtomicUsize::new(dimension),
            snapshot: ArcSwap::from_pointee(snapshot),
            write_lock: Mutex::new(()),
            recovered: false,
        })
    }

    /// Delete an index directory. A missing directory is not an error.
    pub fn destroy(path: impl AsRef<Path>) -> Result<(), StoreError> {
        match std::fs::remove_dir_all(path.as_ref()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Acquire)
    }

    /// Whether `open` had to recreate a corrupt index
    pub fn recovered_from_corruption(&self) -> bool {
        self.recovered
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        // The guard protects no data, so a poisoned lock is still usable
        self.write_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        check_len(self.dimension(), vector)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn upsert(&self, document: Document, vector: Vec<f32>) -> Result<(), StoreError> {
        self.upsert_batch(vec![(document, vector)]).map(|_| ())
    }

    /// Insert or replace a batch of records atomically.
    pub fn upsert_batch(&self, items: Vec<(Document, Vec<f32>)>) -> Result<usize, StoreError> {
        if items.is_empty() {
            return Ok(0);
        }
        for (_, vector) in &items {
            self.check_dimension(vector)?;
        }

        let _guard = self.lock_writer();
        let mut batch = sled::Batch::default();
        let mut next: Snapshot = (**self.snapshot.load()).clone();
        let count = items.len();

        for (document, vector) in items {
            let id = document.id.clone();
            let record = StoredRecord { document, vector };
            batch.insert(id.as_bytes(), serde_json::to_vec(&record)?);
            next.insert(id, Arc::new(record));
        }

        self.records.apply_batch(batch)?;
        self.db.flush()?;
        self.snapshot.store(Arc::new(next));

        debug!(count, "Committed upsert batch");
        Ok(count)
    }

    /// Remove one record. Returns whether it existed.
    pub fn delete_by_id(&self, id: &str) -> Result<bool, StoreError> {
        let _guard = self.lock_writer();
        let current = self.snapshot.load_full();
        if !current.contains_key(id) {
            return Ok(false);
        }

        self.records.remove(id.as_bytes())?;
        self.db.flush()?;

        let mut next: Snapshot = (*current).clone();
        next.remove(id);
        self.snapshot.store(Arc::new(next));
        Ok(true)
    }

    /// Remove every record whose document matches `predicate`.
    pub fn delete_where<F>(&self, predicate: F) -> Result<usize, StoreError>
    where
        F: Fn(&Document) -> bool,
    {
        let _guard = self.lock_writer();
        let current = self.snapshot.load_full();
        let doomed: Vec<String> = current
            .values()
            .filter(|r| predicate(&r.document))
            .map(|r| r.document.id.clone())
            .collect();
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut batch = sled::Batch::default();
        let mut next: Snapshot = (*current).clone();
        for id in &doomed {
            batch.remove(id.as_bytes());
            next.remove(id);
        }
        self.records.apply_batch(batch)?;
        self.db.flush()?;
        self.snapshot.store(Arc::new(next));

        debug!(count = doomed.len(), "Deleted records by predicate");
        Ok(doomed.len())
    }

    /// Replace the whole content with `records` in one atomic batch.
    pub fn replace_all(&self, records: Vec<StoredRecord>) -> Result<usize, StoreError> {
        self.replace_all_at(self.dimension(), records)
    }

    /// Replace the whole content and switch the index to `dimension`.
    ///
    /// Used to restore a snapshot taken before a dimension change and to
    /// empty the index for a full rebuild with a new embedding model.
    pub fn replace_all_at(
        &self,
        dimension: usize,
        records: Vec<StoredRecord>,
    ) -> Result<usize, StoreError> {
        for record in &records {
            check_len(dimension, &record.vector)?;
        }

        let _guard = self.lock_writer();
        let current = self.snapshot.load_full();
        let mut batch = sled::Batch::default();
        let mut next = Snapshot::new();

        for record in records {
            let id = record.document.id.clone();
            batch.insert(id.as_bytes(), serde_json::to_vec(&record)?);
            next.insert(id, Arc::new(record));
        }
        for id in current.keys() {
            if !next.contains_key(id) {
                batch.remove(id.as_bytes());
            }
        }

        self.records.apply_batch(batch)?;
        let previous = self.dimension();
        if previous != dimension {
            self.meta
                .insert(DIMENSION_KEY, (dimension as u64).to_be_bytes().to_vec())?;
            self.dimension.store(dimension, Ordering::Release);
            info!(from = previous, to = dimension, "Index dimension changed");
        }
        self.db.flush()?;
        let count = next.len();
        self.snapshot.store(Arc::new(next));
        Ok(count)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.replace_all(Vec::new()).map(|_| ())
    }

    // ------------------------------------------------------------------
    // Reads (lock-free, last committed snapshot)
    // ------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.snapshot.load().contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<Document> {
        self.snapshot.load().get(id).map(|r| r.document.clone())
    }

    /// `(id, document)` for every record, ordered by id
    pub fn list(&self) -> Vec<(String, Document)> {
        self.snapshot
            .load()
            .iter()
            .map(|(id, r)| (id.clone(), r.document.clone()))
            .collect()
    }

    /// Ids of the records in `category`
    pub fn ids_in(&self, category: Category) -> HashSet<String> {
        self.snapshot
            .load()
            .values()
            .filter(|r| r.document.category() == category)
            .map(|r| r.document.id.clone())
            .collect()
    }

    /// Record count per category; every category is present
    pub fn count_by_category(&self) -> BTreeMap<Category, usize> {
        let mut counts: BTreeMap<Category, usize> =
            Category::ALL.iter().map(|c| (*c, 0)).collect();
        for record in self.snapshot.load().values() {
            *counts.entry(record.document.category()).or_insert(0) += 1;
        }
        counts
    }

    /// Copy of every record, for snapshots
    pub fn export(&self) -> Vec<StoredRecord> {
        self.snapshot
            .load()
            .values()
            .map(|r| (**r).clone())
            .collect()
    }

    /// Top-`k` records by descending cosine similarity, ties by id.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.check_dimension(vector)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let snapshot = self.snapshot.load_full();
        let mut scored: Vec<(f64, &Arc<StoredRecord>)> = snapshot
            .par_iter()
            .map(|(_, record)| (cosine_similarity(vector, &record.vector), record))
            .collect();

        scored.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.document.id.cmp(&b.1.document.id))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchHit {
                id: record.document.id.clone(),
                document: record.document.clone(),
                score,
            })
            .collect())
    }
}

fn check_len(dimension: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() != dimension {
        return Err(StoreError::DimensionMismatch {
            expected: dimension,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Whether `path` is a directory holding any entry
fn has_entries(path: &Path) -> Result<bool, StoreError> {
    match std::fs::read_dir(path) {
        Ok(mut entries) => Ok(entries.next().is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::Io(e)),
    }
}

/// Decide which sled open failures mean an unreadable index.
///
/// I/O errors other than undecodable data (permissions, another process
/// holding the lock) are surfaced; recreating the index would not help.
fn classify_open_error(e: sled::Error) -> StoreError {
    match e {
        sled::Error::Io(ref io)
            if !matches!(
                io.kind(),
                std::io::ErrorKind::InvalidData | std::io::ErrorKind::UnexpectedEof
            ) =>
        {
            StoreError::Database(e)
        }
        other => StoreError::Corrupt(other.to_string()),
    }
}

impl VectorSearch for VectorStore {
    fn search(&self, vector: &[f32], k: usize) -> Result<Vec<SearchHit>, StoreError> {
        self.query(vector, k)
    }
}

// ============================================================================
// Tests
// ============================================================================
