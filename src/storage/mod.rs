//! Index Storage
//!
//! Persists documents and their embeddings in a sled-backed vector index,
//! with point-in-time snapshots for recovery and a process lock guarding
//! ingestion runs.

pub mod backup;
pub mod layout;
pub mod lockfile;
pub mod vector_store;

pub use backup::{restore_snapshot, snapshot_info, write_snapshot, SnapshotInfo};
pub use layout::StorageLayout;
pub use lockfile::ProcessLock;
pub use vector_store::{SearchHit, StoreError, StoredRecord, VectorSearch, VectorStore};
