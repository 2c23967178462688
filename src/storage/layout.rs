//! Directory layout helpers for the persisted index

use std::io;
use std::path::{Path, PathBuf};

use crate::config::defaults::{BACKUP_DIR, BACKUP_FILE, CHECKPOINT_FILE, INDEX_DIR, LOCK_FILE};

/// Paths under the configured base directory:
///
/// ```text
/// <base>/index/                         sled database
/// <base>/backup/index_snapshot.json.zst point-in-time snapshot
/// <base>/ingest_checkpoint.json         ingestion progress
/// <base>/.ingest.lock                   ingestion process lock
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageLayout {
    base: PathBuf,
}

impl StorageLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn index_dir(&self) -> PathBuf {
        self.base.join(INDEX_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.base.join(BACKUP_DIR)
    }

    pub fn backup_path(&self) -> PathBuf {
        self.backup_dir().join(BACKUP_FILE)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.base.join(CHECKPOINT_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base.join(LOCK_FILE)
    }

    /// Create the base and backup directories
    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.base)?;
        std::fs::create_dir_all(self.backup_dir())?;
        Ok(())
    }
}
