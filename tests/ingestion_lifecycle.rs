//! Ingestion lifecycle across runs: cancellation, resume, failure recovery
//! and source reloads against a real on-disk index.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use safety_rag::config::{IngestionConfig, SourcesConfig};
use safety_rag::embedding::{EmbedMode, EmbeddingProvider, ProviderError, RetryPolicy};
use safety_rag::types::checkpoint::load_from_disk;
use safety_rag::types::{DocumentDetail, EducationDetail, IncidentDetail};
use safety_rag::{
    Category, Document, EmbeddingClient, HashEmbedder, IngestError, IngestionPipeline,
    SourceCorpus, StorageLayout, VectorStore,
};

const DIM: usize = 16;

/// Hash embeddings with a call counter, an optional cancel trigger and an
/// optional poisoned marker that fails fatally.
#[derive(Default)]
struct ScriptedProvider {
    calls: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
    fail_on: Option<&'static str>,
}

impl ScriptedProvider {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for ScriptedProvider {
    async fn embed(
        &self,
        text: &str,
        _mode: EmbedMode,
        dimension: usize,
    ) -> Result<Vec<f32>, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((after, token)) = &self.cancel_after {
            if n >= *after {
                token.cancel();
            }
        }
        if let Some(marker) = self.fail_on {
            if text.contains(marker) {
                return Err(ProviderError::Fatal("poisoned input".to_string()));
            }
        }
        Ok(HashEmbedder::new().embed_sync(text, dimension))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

fn doc(category: Category, n: usize, body: &str) -> Document {
    let detail = match category {
        Category::Incident => DocumentDetail::Incident(IncidentDetail::default()),
        Category::Education => DocumentDetail::Education(EducationDetail::default()),
        Category::Regulation => DocumentDetail::Regulation(Default::default()),
    };
    Document {
        id: format!("{category}-{n}"),
        title: format!("{category} {n}"),
        body: body.to_string(),
        tags: BTreeSet::new(),
        risk_keywords: String::new(),
        detail,
    }
}

fn corpus(incidents: usize, education: usize) -> SourceCorpus {
    SourceCorpus::new(
        (0..incidents)
            .map(|n| doc(Category::Incident, n, &format!("incident case {n}")))
            .collect(),
        (0..education)
            .map(|n| doc(Category::Education, n, &format!("training material {n}")))
            .collect(),
        Vec::new(),
    )
}

fn batches() -> IngestionConfig {
    IngestionConfig {
        incident_batch_size: 2,
        education_batch_size: 2,
        regulation_batch_size: 2,
        ..Default::default()
    }
}

fn pipeline(
    base: &Path,
    store: &Arc<VectorStore>,
    provider: Arc<ScriptedProvider>,
    corpus: SourceCorpus,
) -> IngestionPipeline {
    pipeline_with_dimension(base, store, provider, corpus, DIM)
}

fn pipeline_with_dimension(
    base: &Path,
    store: &Arc<VectorStore>,
    provider: Arc<ScriptedProvider>,
    corpus: SourceCorpus,
    dimension: usize,
) -> IngestionPipeline {
    let embedder = EmbeddingClient::new(
        provider,
        RetryPolicy::immediate(0),
        dimension,
        8000,
        Duration::from_secs(5),
    );
    IngestionPipeline::new(
        store.clone(),
        embedder,
        StorageLayout::new(base),
        batches(),
        corpus,
    )
}

fn open_store(base: &Path) -> Arc<VectorStore> {
    Arc::new(VectorStore::open(StorageLayout::new(base).index_dir(), DIM).unwrap())
}

#[tokio::test]
async fn test_cancel_then_resume_embeds_only_remaining_items() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    let cancel = CancellationToken::new();

    let first = Arc::new(ScriptedProvider {
        cancel_after: Some((3, cancel.clone())),
        ..Default::default()
    });
    let err = pipeline(tmp.path(), &store, first.clone(), corpus(5, 2))
        .ingest_all(&cancel)
        .await
        .unwrap_err();

    match err {
        IngestError::Cancelled {
            phase,
            last_completed_index,
        } => {
            assert_eq!(phase, Category::Incident);
            assert_eq!(last_completed_index, Some(2));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(first.calls(), 3);
    assert_eq!(store.len(), 3);

    let cp = load_from_disk(&StorageLayout::new(tmp.path()).checkpoint_path())
        .unwrap()
        .unwrap();
    assert_eq!(cp.phase, Category::Incident);
    assert_eq!(cp.resume_index(), 3);
    assert_eq!(cp.total_count, 5);

    let second = Arc::new(ScriptedProvider::default());
    let summary = pipeline(tmp.path(), &store, second.clone(), corpus(5, 2))
        .ingest_all(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(second.calls(), 4);
    assert_eq!(summary.processed, 4);
    assert_eq!(summary.remaining, 0);
    assert_eq!(store.len(), 7);
    assert!(load_from_disk(&StorageLayout::new(tmp.path()).checkpoint_path())
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_failure_restores_index_and_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    let checkpoint_path = StorageLayout::new(tmp.path()).checkpoint_path();

    // Leave a checkpoint in the incident phase
    let cancel = CancellationToken::new();
    let provider = Arc::new(ScriptedProvider {
        cancel_after: Some((2, cancel.clone())),
        ..Default::default()
    });
    let _ = pipeline(tmp.path(), &store, provider, corpus(4, 2))
        .ingest_all(&cancel)
        .await
        .unwrap_err();
    let before_ids: BTreeSet<String> = store.list().into_iter().map(|(id, _)| id).collect();
    let before_cp = load_from_disk(&checkpoint_path).unwrap().unwrap();

    let failing = Arc::new(ScriptedProvider {
        fail_on: Some("training material 1"),
        ..Default::default()
    });
    let err = pipeline(tmp.path(), &store, failing, corpus(4, 2))
        .ingest_all(&CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        IngestError::Interrupted { phase, reason } => {
            assert_eq!(phase, Category::Education);
            assert!(reason.contains("education-1"));
        }
        other => panic!("expected interruption, got {other:?}"),
    }

    let after_ids: BTreeSet<String> = store.list().into_iter().map(|(id, _)| id).collect();
    assert_eq!(after_ids, before_ids);
    let after_cp = load_from_disk(&checkpoint_path).unwrap().unwrap();
    assert_eq!(after_cp, before_cp);
}

#[tokio::test]
async fn test_resume_incomplete_after_category_delete() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());

    let p = pipeline(
        tmp.path(),
        &store,
        Arc::new(ScriptedProvider::default()),
        corpus(3, 4),
    );
    p.ingest_all(&CancellationToken::new()).await.unwrap();
    let deleted = p.delete_by_category(Category::Education).unwrap();
    assert_eq!(deleted.processed, 4);
    assert_eq!(p.status().unwrap().deficient(), vec![Category::Education]);

    let counting = Arc::new(ScriptedProvider::default());
    let summary = pipeline(tmp.path(), &store, counting.clone(), corpus(3, 4))
        .resume_incomplete(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counting.calls(), 4);
    assert_eq!(summary.processed, 4);
    assert_eq!(store.count_by_category()[&Category::Education], 4);
    assert_eq!(store.count_by_category()[&Category::Incident], 3);
}

#[tokio::test]
async fn test_repeat_ingest_keeps_one_record_per_document() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());

    for _ in 0..3 {
        pipeline(
            tmp.path(),
            &store,
            Arc::new(ScriptedProvider::default()),
            corpus(3, 3),
        )
        .ingest_all(&CancellationToken::new())
        .await
        .unwrap();
    }
    assert_eq!(store.len(), 6);
}

#[tokio::test]
async fn test_sources_reload_and_incremental_rebuild() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("sources");
    std::fs::create_dir_all(&data).unwrap();

    let incidents = data.join("incidents.json");
    std::fs::write(
        &incidents,
        r#"[
            {"title": "Switchgear electrocution", "date": "2023-04-11", "location": "Substation",
             "industry": "Electric power", "accident_type": "Electrocution"},
            {"title": "Crane load drop", "date": "2022-01-20", "location": "Yard",
             "accident_type": "Struck by"}
        ]"#,
    )
    .unwrap();
    let education = data.join("education.json");
    std::fs::write(
        &education,
        r#"[{"title": "Arc flash basics", "doc_number": "EDU-7", "type": "Guide",
             "keywords": "arc flash, PPE", "content": "Wear arc rated clothing"}]"#,
    )
    .unwrap();
    let regulations = data.join("rules.txt");
    std::fs::write(
        &regulations,
        "산업안전보건기준에 관한 규칙\n\
         제323조(절연용 보호구 등의 사용) 사업주는 절연용 보호구를 착용시켜야 한다.\n\
         제42조(추락의 방지) 사업주는 안전난간을 설치하여야 한다.\n",
    )
    .unwrap();

    let sources = SourcesConfig {
        incidents: Some(incidents.clone()),
        education: Some(education),
        regulations: Some(regulations),
        ..Default::default()
    };
    let corpus = SourceCorpus::load(&sources, &batches()).unwrap();
    assert_eq!(corpus.len(Category::Incident), 2);
    assert_eq!(corpus.len(Category::Education), 1);
    assert_eq!(corpus.len(Category::Regulation), 2);

    let store = open_store(tmp.path());
    let p = pipeline(tmp.path(), &store, Arc::new(ScriptedProvider::default()), corpus);
    p.ingest_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(store.len(), 5);

    // Drop one incident from the source and rebuild incrementally
    std::fs::write(
        &incidents,
        r#"[{"title": "Switchgear electrocution", "date": "2023-04-11", "location": "Substation"}]"#,
    )
    .unwrap();
    let reloaded = SourceCorpus::load(&sources, &batches()).unwrap();
    let counting = Arc::new(ScriptedProvider::default());
    let summary = pipeline(tmp.path(), &store, counting.clone(), reloaded)
        .rebuild(false, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(counting.calls(), 0);
    assert_eq!(summary.processed, 0);
    assert_eq!(store.count_by_category()[&Category::Incident], 1);
    assert_eq!(store.len(), 4);
}

#[tokio::test]
async fn test_missing_source_file_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let sources = SourcesConfig {
        incidents: Some(tmp.path().join("absent.json")),
        ..Default::default()
    };
    let err = SourceCorpus::load(&sources, &batches()).unwrap_err();
    assert!(matches!(err, IngestError::Source(_)));
}

#[tokio::test]
async fn test_failed_full_rebuild_after_model_change_keeps_old_index() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    pipeline(tmp.path(), &store, Arc::new(ScriptedProvider::default()), corpus(3, 2))
        .ingest_all(&CancellationToken::new())
        .await
        .unwrap();
    let before = store.export();

    let failing = Arc::new(ScriptedProvider {
        fail_on: Some("training material 0"),
        ..Default::default()
    });
    let err = pipeline_with_dimension(tmp.path(), &store, failing, corpus(3, 2), DIM * 2)
        .rebuild(true, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Interrupted { .. }));

    assert_eq!(store.dimension(), DIM);
    assert_eq!(store.export(), before);
    let backup = StorageLayout::new(tmp.path()).backup_path();
    assert!(backup.exists());

    // The old index survives a restart as well
    drop(store);
    let reopened = open_store(tmp.path());
    assert_eq!(reopened.len(), 5);
}

#[tokio::test]
async fn test_full_rebuild_switches_index_to_new_dimension() {
    let tmp = tempfile::tempdir().unwrap();
    let store = open_store(tmp.path());
    pipeline(tmp.path(), &store, Arc::new(ScriptedProvider::default()), corpus(2, 1))
        .ingest_all(&CancellationToken::new())
        .await
        .unwrap();

    let p = pipeline_with_dimension(
        tmp.path(),
        &store,
        Arc::new(ScriptedProvider::default()),
        corpus(2, 1),
        DIM * 2,
    );
    let summary = p.rebuild(true, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.processed, 3);
    assert_eq!(store.dimension(), DIM * 2);
    assert!(store.export().iter().all(|r| r.vector.len() == DIM * 2));

    drop(p);
    drop(store);
    let reopened =
        VectorStore::open(StorageLayout::new(tmp.path()).index_dir(), DIM * 2).unwrap();
    assert_eq!(reopened.len(), 3);
}

#[tokio::test]
async fn test_incidents_sharing_title_and_date_are_all_indexed() {
    let tmp = tempfile::tempdir().unwrap();
    let incidents = tmp.path().join("incidents.json");
    std::fs::write(
        &incidents,
        r#"[
            {"title": "Fall from height", "date": "2023-03-14", "location": "Plant",
             "summary": "Fell from scaffold while fixing a cable tray"},
            {"title": "Fall from height", "date": "2023-03-14", "location": "Plant",
             "summary": "Fell through an unguarded roof opening"},
            {"title": "Fall from height", "date": "2023-03-14", "location": "Plant",
             "summary": "Fell through an unguarded roof opening"}
        ]"#,
    )
    .unwrap();
    let sources = SourcesConfig {
        incidents: Some(incidents),
        ..Default::default()
    };
    let corpus = SourceCorpus::load(&sources, &batches()).unwrap();
    assert_eq!(corpus.len(Category::Incident), 2);

    let store = open_store(tmp.path());
    let p = pipeline(tmp.path(), &store, Arc::new(ScriptedProvider::default()), corpus);
    p.ingest_all(&CancellationToken::new()).await.unwrap();

    let status = p.status().unwrap();
    assert_eq!(status.indexed[&Category::Incident], 2);
    assert!(status.deficient().is_empty());
}
