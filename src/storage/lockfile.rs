//! Process Lock File Module
//!
//! Prevents two ingestion runs from writing the same index at once,
//! which would interleave batches and checkpoints.

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::config::defaults::LOCK_FILE;

/// Process lock file manager
///
/// Creates a lock file with the current process ID in the base directory.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    /// Acquire the ingestion lock for the given base directory
    ///
    /// Returns an error if another ingestion is already running.
    pub fn acquire<P: AsRef<Path>>(base_dir: P) -> Result<Self> {
        let base_dir = base_dir.as_ref();

        fs::create_dir_all(base_dir)
            .with_context(|| format!("Failed to create base directory: {:?}", base_dir))?;

        let lock_path = base_dir.join(LOCK_FILE);

        if lock_path.exists() {
            match Self::check_existing_lock(&lock_path) {
                Ok(Some(pid)) => {
                    bail!(
                        "Another ingestion is already running (PID: {})\n\
                         \n\
                         To resolve this:\n\
                         1. Wait for it to finish or stop it, or\n\
                         2. If no ingestion is running, remove the stale lock file:\n\
                            rm {:?}",
                        pid,
                        lock_path
                    );
                }
                Ok(None) => {
                    tracing::info!(path = ?lock_path, "Removing stale ingestion lock");
                    fs::remove_file(&lock_path).context("Failed to remove stale lock file")?;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Unreadable ingestion lock, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let mut file = File::create(&lock_path)
            .with_context(|| format!("Failed to create lock file: {:?}", lock_path))?;
        writeln!(file, "{}", pid).context("Failed to write PID to lock file")?;

        tracing::debug!(pid, path = ?lock_path, "Acquired ingestion lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// `Ok(Some(pid))` if held by a live process, `Ok(None)` if stale.
    fn check_existing_lock(lock_path: &Path) -> Result<Option<u32>> {
        let mut file = File::open(lock_path).context("Failed to open existing lock file")?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .context("Failed to read lock file contents")?;

        let pid: u32 = contents
            .trim()
            .parse()
            .context("Failed to parse PID from lock file")?;

        if pid == std::process::id() || Self::is_process_running(pid) {
            Ok(Some(pid))
        } else {
            Ok(None)
        }
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        // Only count it if /proc says it is one of ours
        let proc_path = format!("/proc/{}/cmdline", pid);
        match fs::read_to_string(&proc_path) {
            Ok(cmdline) => cmdline.contains("safety-rag") || cmdline.contains("safety_rag"),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    /// Release the lock (called automatically on drop)
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            } else {
                tracing::debug!(path = ?self.lock_path, "Released ingestion lock");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
