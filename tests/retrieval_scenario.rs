//! End-to-end retrieval over a small ingested corpus
//!
//! Ingests a handful of incident, education and regulation records with the
//! offline hash embedder, then runs the retriever against the on-disk index.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use safety_rag::config::{IngestionConfig, RetrievalConfig, ScoringConfig};
use safety_rag::embedding::RetryPolicy;
use safety_rag::ingestion::sources::{
    education_document, incident_document, regulation_documents, ArticleRecord, EducationRecord,
    IncidentRecord,
};
use safety_rag::ingestion::TextSplitter;
use safety_rag::types::Category;
use safety_rag::{
    EmbeddingClient, Equipment, HashEmbedder, IngestionPipeline, ProfileCatalog, RetrievalError,
    RiskFactor, SafetyRetriever, SourceCorpus, StorageLayout, VectorStore, WorkType,
};

const DIM: usize = 128;

const CATALOG: &str = r#"
[[profiles]]
id = "electrical-hv"
keywords = ["electrocution", "switchgear", "insulating", "live line"]
exclude_keywords = ["welding"]
include_if_any = ["kv"]
queries.incident = ["{equipment} {work_type} electrocution accident"]
queries.regulation = ["insulating protective equipment for electrical work"]

[profiles.rules]
equipment_name_pattern = '\bGIS\b|switchgear|\d+\s*kV\b'

[profiles.priority_keywords]
electrocution = 0.05

[[profiles]]
id = "default"
keywords = ["safety"]
"#;

fn embedder() -> EmbeddingClient {
    EmbeddingClient::new(
        Arc::new(HashEmbedder::new()),
        RetryPolicy::immediate(0),
        DIM,
        8000,
        Duration::from_secs(5),
    )
}

fn corpus() -> SourceCorpus {
    let incidents = vec![
        incident_document(&IncidentRecord {
            title: "Switchgear electrocution".into(),
            date: "2023-04-11".into(),
            location: "Substation".into(),
            industry: "Electric power".into(),
            work_type: "Inspection".into(),
            accident_type: "Electrocution".into(),
            summary: "Worker touched a live busbar inside a 170kV GIS switchgear during inspection"
                .into(),
            direct_cause: "Live line not isolated before opening the enclosure".into(),
            risk_keywords: "electrocution, high voltage, switchgear".into(),
            prevention: "Isolate, earth and verify absence of voltage; wear insulating gloves"
                .into(),
            ..Default::default()
        }),
        incident_document(&IncidentRecord {
            title: "Forklift overturn".into(),
            date: "2022-09-02".into(),
            location: "Warehouse".into(),
            industry: "Logistics".into(),
            work_type: "Transport".into(),
            accident_type: "Overturn".into(),
            summary: "Forklift overturned on a ramp while carrying pallets".into(),
            ..Default::default()
        }),
    ];

    let education = vec![
        education_document(&EducationRecord {
            title: "Welding safety".into(),
            doc_number: "EDU-001".into(),
            material_type: "Guide".into(),
            keywords: "welding, fume, hot work".into(),
            content: "Ventilation and fire watch for welding and hot work near electrical switchgear"
                .into(),
            ..Default::default()
        }),
        education_document(&EducationRecord {
            title: "High voltage GIS inspection training".into(),
            doc_number: "EDU-002".into(),
            material_type: "Video".into(),
            keywords: "kV, GIS, inspection, electrocution".into(),
            content: "Lockout and insulating protective equipment for 170kV GIS inspection".into(),
            ..Default::default()
        }),
    ];

    let splitter = TextSplitter::new(1000, 100);
    let source = "Occupational Safety and Health Standards Rules";
    let mut regulations = regulation_documents(
        &ArticleRecord {
            article_number: "323".into(),
            title: "Article 323 insulating protective equipment".into(),
            body: "When performing electrical work near live lines the employer shall provide \
                   insulating protective equipment and make workers wear it."
                .into(),
        },
        source,
        &splitter,
    );
    regulations.extend(regulation_documents(
        &ArticleRecord {
            article_number: "42".into(),
            title: "Article 42 prevention of falls".into(),
            body: "Where a worker may fall from height the employer shall install guard rails."
                .into(),
        },
        source,
        &splitter,
    ));

    SourceCorpus::new(incidents, education, regulations)
}

async fn indexed_retriever(base: &std::path::Path) -> SafetyRetriever {
    let layout = StorageLayout::new(base);
    layout.ensure_dirs().unwrap();
    let store = Arc::new(VectorStore::open(layout.index_dir(), DIM).unwrap());

    let pipeline = IngestionPipeline::new(
        store.clone(),
        embedder(),
        layout,
        IngestionConfig::default(),
        corpus(),
    );
    let summary = pipeline.ingest_all(&CancellationToken::new()).await.unwrap();
    assert_eq!(summary.remaining, 0);

    let catalog = ProfileCatalog::from_toml_str(CATALOG).unwrap();
    SafetyRetriever::new(
        Arc::new(catalog),
        embedder(),
        store,
        &RetrievalConfig::default(),
        &ScoringConfig::default(),
    )
}

fn gis() -> Equipment {
    Equipment::new("170kV GIS")
        .with_tags(["electrical", "substation"])
        .with_risk_factor(RiskFactor::new("high_voltage").with_detail("live busbar"))
}

#[tokio::test]
async fn test_gis_inspection_briefing() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = indexed_retriever(tmp.path()).await;

    let result = retriever
        .retrieve(&gis(), &WorkType::new("inspection"))
        .await
        .unwrap();

    assert_eq!(result.profile_id, "electrical-hv");

    let incident_titles: Vec<_> = result.incidents.iter().map(|d| d.title.as_str()).collect();
    assert!(incident_titles.contains(&"Switchgear electrocution"));
    assert_eq!(incident_titles[0], "Switchgear electrocution");

    assert!(result
        .regulations
        .iter()
        .any(|d| d.title == "Article 323 insulating protective equipment"));

    assert!(result.education.iter().all(|d| d.title != "Welding safety"));

    for category in Category::ALL {
        let docs = result.get(category);
        assert!(docs.iter().all(|d| d.category == category));
        assert!(docs.iter().all(|d| (0.0..=1.0).contains(&d.score)));
        assert!(docs.windows(2).all(|w| w[0].score >= w[1].score));
    }

    let context = result.render_context();
    assert!(context.contains("## Related incidents"));
    assert!(context.contains("Switchgear electrocution (2023-04-11)"));
    assert!(!context.contains("Welding safety"));
}

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = indexed_retriever(tmp.path()).await;
    let work = WorkType::new("inspection");

    let first = retriever.retrieve(&gis(), &work).await.unwrap();
    let second = retriever.retrieve(&gis(), &work).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_unmatched_equipment_uses_catch_all() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = indexed_retriever(tmp.path()).await;

    let plan = retriever
        .plan(&Equipment::new("Forklift"), &WorkType::new("transport"))
        .unwrap();
    assert!(!plan.all_queries.is_empty());

    let result = retriever
        .retrieve(&Equipment::new("Forklift"), &WorkType::new("transport"))
        .await
        .unwrap();
    assert_eq!(result.profile_id, "default");
}

#[tokio::test]
async fn test_blank_equipment_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let retriever = indexed_retriever(tmp.path()).await;

    let err = retriever
        .retrieve(&Equipment::new("   "), &WorkType::new("inspection"))
        .await
        .unwrap_err();
    assert!(matches!(err, RetrievalError::InvalidInput(_)));
}

#[tokio::test]
async fn test_empty_index_yields_empty_result() {
    let tmp = tempfile::tempdir().unwrap();
    let layout = StorageLayout::new(tmp.path());
    let store = Arc::new(VectorStore::open(layout.index_dir(), DIM).unwrap());
    let retriever = SafetyRetriever::new(
        Arc::new(ProfileCatalog::from_toml_str(CATALOG).unwrap()),
        embedder(),
        store,
        &RetrievalConfig::default(),
        &ScoringConfig::default(),
    );

    let result = retriever
        .retrieve(&gis(), &WorkType::new("inspection"))
        .await
        .unwrap();
    assert!(result.is_empty());
    assert_eq!(
        result.render_context().matches("No related cases found.").count(),
        3
    );
}
