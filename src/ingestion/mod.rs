//! Ingestion Pipeline
//!
//! Bulk-loads the three corpora into the vector store in the fixed phase
//! order `incident -> education -> regulation`.
//!
//! ## Run lifecycle
//!
//! 1. Acquire the process lock (one ingestion per base path)
//! 2. Read the checkpoint left by an earlier run, if any
//! 3. Snapshot the index to the backup location
//! 4. Per phase: embed each item, commit every `batch_size` items, then
//!    persist a checkpoint
//! 5. Success removes the checkpoint. Failure restores the snapshot and the
//!    run-start checkpoint. Cancellation flushes the pending batch and leaves
//!    a resumable checkpoint.

pub mod chunking;
pub mod sources;

pub use chunking::TextSplitter;
pub use sources::SourceCorpus;

use std::collections::{BTreeMap, HashSet};
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::IngestionConfig;
use crate::embedding::{EmbedMode, EmbeddingClient};
use crate::storage::{
    restore_snapshot, snapshot_info, write_snapshot, ProcessLock, SnapshotInfo, StorageLayout,
    StoreError, VectorStore,
};
use crate::types::checkpoint::{load_from_disk, remove_from_disk, save_to_disk};
use crate::types::{Category, Document, IngestSummary, IngestionCheckpoint};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum IngestError {
    /// Unrecoverable failure; the index and checkpoint were put back
    #[error("Ingestion interrupted during {phase} phase: {reason}. The index was restored from backup, retry the operation")]
    Interrupted { phase: Category, reason: String },

    /// Cooperative cancellation; progress up to the last commit is kept
    #[error("Ingestion cancelled during {phase} phase; run resume to continue")]
    Cancelled {
        phase: Category,
        last_completed_index: Option<usize>,
    },

    #[error("{0}")]
    Locked(String),

    #[error("Source error: {0}")]
    Source(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Checkpoint I/O error: {0}")]
    Checkpoint(#[source] io::Error),

    #[error("No embedding provider configured for this operation")]
    NoEmbedder,
}

/// How a run of embed-and-commit work stopped early
enum RunStop {
    Cancelled {
        phase: Category,
        last_completed_index: Option<usize>,
    },
    Failed {
        phase: Category,
        reason: String,
    },
}

// ============================================================================
// Status
// ============================================================================

/// Snapshot of the index and ingestion state for operators
#[derive(Debug, Clone)]
pub struct IngestStatus {
    pub indexed: BTreeMap<Category, usize>,
    pub source: BTreeMap<Category, usize>,
    pub checkpoint: Option<IngestionCheckpoint>,
    pub backup: Option<SnapshotInfo>,
    pub recovered_from_corruption: bool,
}

impl IngestStatus {
    /// Categories holding fewer documents than their source
    pub fn deficient(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| {
                let indexed = self.indexed.get(c).copied().unwrap_or(0);
                indexed < self.source.get(c).copied().unwrap_or(0)
            })
            .collect()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

pub struct IngestionPipeline {
    store: Arc<VectorStore>,
    /// Absent for maintenance pipelines that only read and delete
    embedder: Option<EmbeddingClient>,
    layout: StorageLayout,
    config: IngestionConfig,
    corpus: SourceCorpus,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<VectorStore>,
        embedder: EmbeddingClient,
        layout: StorageLayout,
        config: IngestionConfig,
        corpus: SourceCorpus,
    ) -> Self {
        Self {
            store,
            embedder: Some(embedder),
            layout,
            config,
            corpus,
        }
    }

    /// Pipeline for status and deletes, which never embed. Embedding
    /// operations on it fail with `IngestError::NoEmbedder`.
    pub fn maintenance(
        store: Arc<VectorStore>,
        layout: StorageLayout,
        config: IngestionConfig,
        corpus: SourceCorpus,
    ) -> Self {
        Self {
            store,
            embedder: None,
            layout,
            config,
            corpus,
        }
    }

    pub fn corpus(&self) -> &SourceCorpus {
        &self.corpus
    }

    fn batch_size(&self, category: Category) -> usize {
        let size = match category {
            Category::Incident => self.config.incident_batch_size,
            Category::Education => self.config.education_batch_size,
            Category::Regulation => self.config.regulation_batch_size,
        };
        size.max(1)
    }

    fn embedder(&self) -> Result<&EmbeddingClient, IngestError> {
        self.embedder.as_ref().ok_or(IngestError::NoEmbedder)
    }

    /// Embedder whose vectors fit the index as it stands
    fn matching_embedder(&self) -> Result<&EmbeddingClient, IngestError> {
        let embedder = self.embedder()?;
        if embedder.dimension() != self.store.dimension() {
            return Err(StoreError::DimensionMismatch {
                expected: self.store.dimension(),
                actual: embedder.dimension(),
            }
            .into());
        }
        Ok(embedder)
    }

    fn lock(&self) -> Result<ProcessLock, IngestError> {
        ProcessLock::acquire(self.layout.base()).map_err(|e| IngestError::Locked(format!("{e:#}")))
    }

    /// Ingest every corpus, resuming from a checkpoint when one exists.
    pub async fn ingest_all(&self, cancel: &CancellationToken) -> Result<IngestSummary, IngestError> {
        let embedder = self.matching_embedder()?;
        let _lock = self.lock()?;
        let run_id = Uuid::new_v4();
        let start_checkpoint = self.read_checkpoint()?;
        if let Some(cp) = &start_checkpoint {
            info!(
                %run_id,
                phase = %cp.phase,
                resume_index = cp.resume_index(),
                total = cp.total_count,
                "Resuming ingestion from checkpoint"
            );
        } else {
            info!(%run_id, total = self.corpus.total(), "Starting full ingestion");
        }

        write_snapshot(&self.store, &self.layout.backup_path())?;
        let outcome = self
            .run_phases(embedder, start_checkpoint.as_ref(), cancel)
            .await;
        self.finish(run_id, outcome, start_checkpoint.as_ref())
    }

    /// Embed only the documents missing from categories whose live count is
    /// below their source count. Present documents are never re-embedded.
    pub async fn resume_incomplete(
        &self,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary, IngestError> {
        let embedder = self.matching_embedder()?;
        let _lock = self.lock()?;
        let run_id = Uuid::new_v4();
        let start_checkpoint = self.read_checkpoint()?;
        let counts = self.store.count_by_category();

        let deficient: Vec<Category> = Category::ALL
            .into_iter()
            .filter(|c| counts.get(c).copied().unwrap_or(0) < self.corpus.len(*c))
            .collect();
        if deficient.is_empty() {
            info!(%run_id, "All categories complete, nothing to resume");
            remove_from_disk(&self.layout.checkpoint_path()).map_err(IngestError::Checkpoint)?;
            return Ok(IngestSummary {
                processed: 0,
                total: self.corpus.total(),
                remaining: self.missing_count(),
            });
        }

        info!(%run_id, categories = ?deficient, "Resuming incomplete categories");
        write_snapshot(&self.store, &self.layout.backup_path())?;
        let outcome = self.run_missing(embedder, &deficient, cancel).await;
        self.finish(run_id, outcome, start_checkpoint.as_ref())
    }

    /// Rebuild the index from the current sources.
    ///
    /// `force_full` clears the index and re-embeds everything, switching
    /// the index to the embedder's dimension when the model changed. A
    /// failed full rebuild restores the previous index, dimension included.
    /// Otherwise documents no longer in the sources are pruned and only
    /// missing ones are embedded.
    pub async fn rebuild(
        &self,
        force_full: bool,
        cancel: &CancellationToken,
    ) -> Result<IngestSummary, IngestError> {
        let embedder = if force_full {
            self.embedder()?
        } else {
            self.matching_embedder()?
        };
        let _lock = self.lock()?;
        let run_id = Uuid::new_v4();
        let start_checkpoint = self.read_checkpoint()?;
        write_snapshot(&self.store, &self.layout.backup_path())?;

        if force_full {
            info!(
                %run_id,
                total = self.corpus.total(),
                dimension = embedder.dimension(),
                "Full rebuild requested"
            );
            if let Err(e) = self.store.replace_all_at(embedder.dimension(), Vec::new()) {
                self.recover(start_checkpoint.as_ref());
                return Err(e.into());
            }
            remove_from_disk(&self.layout.checkpoint_path()).map_err(IngestError::Checkpoint)?;
            let outcome = self.run_phases(embedder, None, cancel).await;
            return self.finish(run_id, outcome, start_checkpoint.as_ref());
        }

        let wanted: HashSet<String> = self.corpus.ids().into_iter().map(str::to_string).collect();
        let pruned = match self.store.delete_where(|doc| !wanted.contains(&doc.id)) {
            Ok(n) => n,
            Err(e) => {
                self.recover(start_checkpoint.as_ref());
                return Err(e.into());
            }
        };
        info!(%run_id, pruned, "Pruned documents no longer in the sources");

        let outcome = self.run_missing(embedder, &Category::ALL, cancel).await;
        self.finish(run_id, outcome, start_checkpoint.as_ref())
    }

    /// Remove every document of `category` from the index.
    pub fn delete_by_category(&self, category: Category) -> Result<IngestSummary, IngestError> {
        let _lock = self.lock()?;
        let start_checkpoint = self.read_checkpoint()?;
        write_snapshot(&self.store, &self.layout.backup_path())?;

        let deleted = match self.store.delete_where(|doc| doc.category() == category) {
            Ok(n) => n,
            Err(e) => {
                self.recover(start_checkpoint.as_ref());
                return Err(e.into());
            }
        };

        // A checkpoint at or past this phase would skip it on resume
        if start_checkpoint.as_ref().is_some_and(|cp| cp.phase >= category) {
            remove_from_disk(&self.layout.checkpoint_path()).map_err(IngestError::Checkpoint)?;
        }

        info!(category = %category, deleted, "Category deleted from index");
        Ok(IngestSummary {
            processed: deleted,
            total: deleted,
            remaining: 0,
        })
    }

    pub fn status(&self) -> Result<IngestStatus, IngestError> {
        let source = Category::ALL
            .into_iter()
            .map(|c| (c, self.corpus.len(c)))
            .collect();
        Ok(IngestStatus {
            indexed: self.store.count_by_category(),
            source,
            checkpoint: self.read_checkpoint()?,
            backup: snapshot_info(&self.layout.backup_path())?,
            recovered_from_corruption: self.store.recovered_from_corruption(),
        })
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn read_checkpoint(&self) -> Result<Option<IngestionCheckpoint>, IngestError> {
        let cp = match load_from_disk(&self.layout.checkpoint_path()) {
            Ok(cp) => cp,
            // An unreadable checkpoint means resuming from the start
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(
                    path = %self.layout.checkpoint_path().display(),
                    error = %e,
                    "Ignoring undecodable checkpoint"
                );
                None
            }
            Err(e) => return Err(IngestError::Checkpoint(e)),
        };
        match cp {
            Some(cp) if !cp.is_consistent() => {
                warn!(
                    phase = %cp.phase,
                    last_completed_index = cp.last_completed_index,
                    total = cp.total_count,
                    "Ignoring inconsistent checkpoint"
                );
                Ok(None)
            }
            other => Ok(other),
        }
    }

    fn missing_count(&self) -> usize {
        Category::ALL
            .iter()
            .flat_map(|c| self.corpus.documents(*c))
            .filter(|d| !self.store.contains(&d.id))
            .count()
    }

    /// Map a run outcome to the public result, cleaning up or recovering.
    fn finish(
        &self,
        run_id: Uuid,
        outcome: Result<usize, RunStop>,
        start_checkpoint: Option<&IngestionCheckpoint>,
    ) -> Result<IngestSummary, IngestError> {
        match outcome {
            Ok(processed) => {
                remove_from_disk(&self.layout.checkpoint_path()).map_err(IngestError::Checkpoint)?;
                let summary = IngestSummary {
                    processed,
                    total: self.corpus.total(),
                    remaining: self.missing_count(),
                };
                info!(
                    %run_id,
                    processed = summary.processed,
                    total = summary.total,
                    remaining = summary.remaining,
                    "Ingestion complete"
                );
                Ok(summary)
            }
            Err(RunStop::Cancelled {
                phase,
                last_completed_index,
            }) => {
                info!(%run_id, phase = %phase, ?last_completed_index, "Ingestion cancelled");
                Err(IngestError::Cancelled {
                    phase,
                    last_completed_index,
                })
            }
            Err(RunStop::Failed { phase, reason }) => {
                error!(%run_id, phase = %phase, reason = %reason, "Ingestion failed, restoring backup");
                self.recover(start_checkpoint);
                Err(IngestError::Interrupted { phase, reason })
            }
        }
    }

    /// Put the index and checkpoint back to their run-start state.
    fn recover(&self, start_checkpoint: Option<&IngestionCheckpoint>) {
        if let Err(e) = restore_snapshot(&self.store, &self.layout.backup_path()) {
            error!(error = %e, "Failed to restore index backup");
        }
        let path = self.layout.checkpoint_path();
        let restored = match start_checkpoint {
            Some(cp) => save_to_disk(cp, &path),
            None => remove_from_disk(&path),
        };
        if let Err(e) = restored {
            error!(error = %e, "Failed to restore ingestion checkpoint");
        }
    }

    /// Walk the phases in order, starting where `checkpoint` left off.
    async fn run_phases(
        &self,
        embedder: &EmbeddingClient,
        checkpoint: Option<&IngestionCheckpoint>,
        cancel: &CancellationToken,
    ) -> Result<usize, RunStop> {
        let mut processed = 0usize;

        for phase in Category::ALL {
            let docs = self.corpus.documents(phase);
            let start = match checkpoint {
                Some(cp) if phase < cp.phase => continue,
                Some(cp) if phase == cp.phase => {
                    if cp.total_count == docs.len() {
                        cp.resume_index()
                    } else {
                        warn!(
                            phase = %phase,
                            checkpoint_total = cp.total_count,
                            source_total = docs.len(),
                            "Source changed since checkpoint, restarting phase"
                        );
                        0
                    }
                }
                _ => 0,
            };
            if start >= docs.len() {
                continue;
            }

            info!(phase = %phase, start, total = docs.len(), "Ingestion phase started");
            let items: Vec<(usize, &Document)> = docs.iter().enumerate().skip(start).collect();
            self.embed_and_commit(embedder, phase, &items, docs.len(), true, &mut processed, cancel)
                .await?;
            info!(phase = %phase, "Ingestion phase finished");
        }
        Ok(processed)
    }

    /// Embed the documents of `categories` that are not in the store yet.
    async fn run_missing(
        &self,
        embedder: &EmbeddingClient,
        categories: &[Category],
        cancel: &CancellationToken,
    ) -> Result<usize, RunStop> {
        let mut processed = 0usize;
        for &phase in categories {
            let docs = self.corpus.documents(phase);
            let present = self.store.ids_in(phase);
            let items: Vec<(usize, &Document)> = docs
                .iter()
                .enumerate()
                .filter(|(_, d)| !present.contains(&d.id))
                .collect();
            if items.is_empty() {
                continue;
            }
            info!(phase = %phase, missing = items.len(), total = docs.len(), "Embedding missing documents");
            self.embed_and_commit(embedder, phase, &items, docs.len(), false, &mut processed, cancel)
                .await?;
        }
        Ok(processed)
    }

    /// Embed `items` in order, committing every batch. With `checkpointing`
    /// a checkpoint naming the last committed source index follows each
    /// commit.
    #[allow(clippy::too_many_arguments)]
    async fn embed_and_commit(
        &self,
        embedder: &EmbeddingClient,
        phase: Category,
        items: &[(usize, &Document)],
        total: usize,
        checkpointing: bool,
        processed: &mut usize,
        cancel: &CancellationToken,
    ) -> Result<(), RunStop> {
        let batch_size = self.batch_size(phase);
        let mut pending: Vec<(Document, Vec<f32>)> = Vec::with_capacity(batch_size);
        let mut last_index: Option<usize> = None;
        // Source index committed before this call, for contiguous runs
        let committed_before = items.first().and_then(|(i, _)| i.checked_sub(1));

        for &(index, doc) in items {
            let embedded = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = embedder.embed(&doc.body, EmbedMode::Document) => Some(result),
            };

            let vector = match embedded {
                None => {
                    self.commit(phase, &mut pending, last_index, total, checkpointing, *processed)?;
                    return Err(RunStop::Cancelled {
                        phase,
                        last_completed_index: last_index.or(committed_before),
                    });
                }
                Some(Ok(vector)) => vector,
                Some(Err(e)) => {
                    return Err(RunStop::Failed {
                        phase,
                        reason: format!("embedding '{}' failed: {e}", doc.id),
                    })
                }
            };

            pending.push((doc.clone(), vector));
            *processed += 1;
            last_index = Some(index);

            if pending.len() >= batch_size {
                self.commit(phase, &mut pending, last_index, total, checkpointing, *processed)?;
            }
        }

        self.commit(phase, &mut pending, last_index, total, checkpointing, *processed)
    }

    fn commit(
        &self,
        phase: Category,
        pending: &mut Vec<(Document, Vec<f32>)>,
        last_index: Option<usize>,
        total: usize,
        checkpointing: bool,
        processed: usize,
    ) -> Result<(), RunStop> {
        if pending.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(pending);
        let written = self.store.upsert_batch(batch).map_err(|e| RunStop::Failed {
            phase,
            reason: format!("batch commit failed: {e}"),
        })?;

        if let (true, Some(index)) = (checkpointing, last_index) {
            let cp = IngestionCheckpoint::new(phase, index, total, processed);
            save_to_disk(&cp, &self.layout.checkpoint_path()).map_err(|e| RunStop::Failed {
                phase,
                reason: format!("checkpoint write failed: {e}"),
            })?;
        }
        info!(
            phase = %phase,
            written,
            last_index = ?last_index,
            total,
            processed,
            "Batch committed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::{HashEmbedder, RetryPolicy};
    use crate::types::{DocumentDetail, EducationDetail, IncidentDetail, RegulationDetail};
    use std::collections::BTreeSet;
    use std::time::Duration;

    const DIM: usize = 16;

    fn doc(category: Category, n: usize) -> Document {
        let detail = match category {
            Category::Incident => DocumentDetail::Incident(IncidentDetail::default()),
            Category::Education => DocumentDetail::Education(EducationDetail::default()),
            Category::Regulation => DocumentDetail::Regulation(RegulationDetail {
                article_number: n.to_string(),
                ..Default::default()
            }),
        };
        Document {
            id: format!("{category}-{n}"),
            title: format!("{category} {n}"),
            body: format!("{category} document number {n}"),
            tags: BTreeSet::new(),
            risk_keywords: String::new(),
            detail,
        }
    }

    fn corpus(incidents: usize, education: usize, regulations: usize) -> SourceCorpus {
        SourceCorpus::new(
            (0..incidents).map(|n| doc(Category::Incident, n)).collect(),
            (0..education).map(|n| doc(Category::Education, n)).collect(),
            (0..regulations).map(|n| doc(Category::Regulation, n)).collect(),
        )
    }

    fn pipeline(base: &std::path::Path, corpus: SourceCorpus) -> IngestionPipeline {
        let layout = StorageLayout::new(base);
        let store = Arc::new(VectorStore::open(layout.index_dir(), DIM).unwrap());
        let embedder = EmbeddingClient::new(
            Arc::new(HashEmbedder::new()),
            RetryPolicy::immediate(0),
            DIM,
            8000,
            Duration::from_secs(5),
        );
        let config = IngestionConfig {
            incident_batch_size: 2,
            education_batch_size: 3,
            regulation_batch_size: 2,
            ..Default::default()
        };
        IngestionPipeline::new(store, embedder, layout, config, corpus)
    }

    #[tokio::test]
    async fn test_ingest_all_fills_every_category() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(3, 4, 2));
        let summary = p.ingest_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(summary, IngestSummary { processed: 9, total: 9, remaining: 0 });
        let status = p.status().unwrap();
        assert_eq!(status.indexed[&Category::Incident], 3);
        assert_eq!(status.indexed[&Category::Education], 4);
        assert_eq!(status.indexed[&Category::Regulation], 2);
        assert!(status.checkpoint.is_none());
        assert!(status.backup.is_some());
        assert!(status.deficient().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_is_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(2, 2, 2));
        p.ingest_all(&CancellationToken::new()).await.unwrap();
        p.ingest_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(p.store.len(), 6);
    }

    #[tokio::test]
    async fn test_cancelled_run_leaves_resumable_state() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(3, 0, 0));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = p.ingest_all(&cancel).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Cancelled { phase: Category::Incident, last_completed_index: None }
        ));
        assert!(p.store.is_empty());
        assert!(!tmp.path().join(".ingest.lock").exists());
    }

    #[tokio::test]
    async fn test_resume_from_checkpoint_skips_completed_items() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(4, 2, 0));

        // Incidents 0..=1 committed by an earlier run
        let early: Vec<_> = p.corpus.documents(Category::Incident)[..2]
            .iter()
            .map(|d| (d.clone(), HashEmbedder::new().embed_sync(&d.body, DIM)))
            .collect();
        p.store.upsert_batch(early).unwrap();
        let cp = IngestionCheckpoint::new(Category::Incident, 1, 4, 2);
        save_to_disk(&cp, &p.layout.checkpoint_path()).unwrap();

        let summary = p.ingest_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.remaining, 0);
        assert!(load_from_disk(&p.layout.checkpoint_path()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resume_incomplete_only_embeds_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(3, 2, 1));
        let present: Vec<_> = p.corpus.documents(Category::Incident)[..2]
            .iter()
            .map(|d| (d.clone(), HashEmbedder::new().embed_sync(&d.body, DIM)))
            .collect();
        p.store.upsert_batch(present).unwrap();

        let summary = p.resume_incomplete(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.remaining, 0);

        let again = p.resume_incomplete(&CancellationToken::new()).await.unwrap();
        assert_eq!(again.processed, 0);
    }

    #[tokio::test]
    async fn test_rebuild_prunes_stale_documents() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(2, 1, 1));
        p.ingest_all(&CancellationToken::new()).await.unwrap();
        p.store
            .upsert(doc(Category::Incident, 99), vec![0.25; DIM])
            .unwrap();

        let summary = p.rebuild(false, &CancellationToken::new()).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert!(!p.store.contains("incident-99"));
        assert_eq!(p.store.len(), 4);

        let full = p.rebuild(true, &CancellationToken::new()).await.unwrap();
        assert_eq!(full.processed, 4);
    }

    #[tokio::test]
    async fn test_delete_by_category_clears_later_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(2, 2, 0));
        p.ingest_all(&CancellationToken::new()).await.unwrap();
        let cp = IngestionCheckpoint::new(Category::Education, 0, 2, 3);
        save_to_disk(&cp, &p.layout.checkpoint_path()).unwrap();

        let summary = p.delete_by_category(Category::Incident).unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(p.store.count_by_category()[&Category::Incident], 0);
        assert_eq!(p.store.count_by_category()[&Category::Education], 2);
        assert!(load_from_disk(&p.layout.checkpoint_path()).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_run_is_locked_out() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(1, 0, 0));
        let _held = ProcessLock::acquire(tmp.path()).unwrap();
        let err = p.ingest_all(&CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, IngestError::Locked(_)));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_before_embedding() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = StorageLayout::new(tmp.path());
        let store = Arc::new(VectorStore::open(layout.index_dir(), DIM).unwrap());
        let embedder = EmbeddingClient::new(
            Arc::new(HashEmbedder::new()),
            RetryPolicy::immediate(0),
            DIM * 2,
            8000,
            Duration::from_secs(5),
        );
        let p = IngestionPipeline::new(
            store.clone(),
            embedder,
            layout,
            IngestionConfig::default(),
            corpus(2, 0, 0),
        );

        for result in [
            p.ingest_all(&CancellationToken::new()).await,
            p.resume_incomplete(&CancellationToken::new()).await,
            p.rebuild(false, &CancellationToken::new()).await,
        ] {
            assert!(matches!(
                result,
                Err(IngestError::Store(StoreError::DimensionMismatch { .. }))
            ));
        }
        assert!(store.is_empty());
        assert_eq!(store.dimension(), DIM);
    }

    #[tokio::test]
    async fn test_maintenance_pipeline_reports_and_deletes_without_embedder() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(2, 2, 0));
        p.ingest_all(&CancellationToken::new()).await.unwrap();

        let maintenance = IngestionPipeline::maintenance(
            p.store.clone(),
            StorageLayout::new(tmp.path()),
            IngestionConfig::default(),
            corpus(2, 2, 0),
        );
        let status = maintenance.status().unwrap();
        assert_eq!(status.indexed[&Category::Education], 2);

        let deleted = maintenance.delete_by_category(Category::Education).unwrap();
        assert_eq!(deleted.processed, 2);
        assert_eq!(maintenance.status().unwrap().deficient(), vec![Category::Education]);

        let err = maintenance
            .resume_incomplete(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NoEmbedder));
        assert_eq!(p.store.count_by_category()[&Category::Education], 0);
    }

    #[tokio::test]
    async fn test_undecodable_checkpoint_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let p = pipeline(tmp.path(), corpus(2, 1, 0));
        std::fs::write(p.layout.checkpoint_path(), b"{\"phase\": \"incid").unwrap();

        assert!(p.status().unwrap().checkpoint.is_none());
        let summary = p.ingest_all(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.processed, 3);
        assert_eq!(summary.remaining, 0);
        assert!(!p.layout.checkpoint_path().exists());
    }
}
