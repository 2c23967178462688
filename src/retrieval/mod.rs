//! Retrieval path
//!
//! ```text
//! Equipment + WorkType
//!   -> ProfileCatalog::resolve        (profile)
//!   -> QueryBuilder::build            (per-category sub-queries)
//!   -> RetrievalOrchestrator::search  (bounded concurrent embed + search)
//!   -> HybridScorer                   (score, per-category acceptance)
//!   -> ResultComposer                 (rank, merge articles, truncate)
//! ```
//!
//! Read-path failures never fail a request: a sub-query whose embedding or
//! search fails is dropped. Only malformed input is an error.

pub mod composer;
pub mod orchestrator;
pub mod query_builder;
pub mod scorer;
pub mod tokenize;

pub use composer::{ResultComposer, RetrievalResult, RetrievedDocument};
pub use orchestrator::{Candidate, CategoryBuckets, RetrievalOrchestrator};
pub use query_builder::{QueryBuilder, QueryPlan};
pub use scorer::{HybridScorer, ScoreSignals, ScoredCandidate, ScoringContext};

use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::config::{RetrievalConfig, ScoringConfig};
use crate::embedding::EmbeddingClient;
use crate::profile::ProfileCatalog;
use crate::storage::VectorSearch;
use crate::types::{Category, Equipment, WorkType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    #[error("Invalid retrieval input: {0}")]
    InvalidInput(String),
}

/// Entry point of the retrieval engine
pub struct SafetyRetriever {
    catalog: Arc<ProfileCatalog>,
    builder: QueryBuilder,
    orchestrator: RetrievalOrchestrator,
    scorer: HybridScorer,
    composer: ResultComposer,
}

impl SafetyRetriever {
    pub fn new(
        catalog: Arc<ProfileCatalog>,
        embedder: EmbeddingClient,
        index: Arc<dyn VectorSearch>,
        retrieval: &RetrievalConfig,
        scoring: &ScoringConfig,
    ) -> Self {
        Self {
            catalog,
            builder: QueryBuilder::new(retrieval.synthesized_query_tokens),
            orchestrator: RetrievalOrchestrator::new(
                embedder,
                index,
                retrieval.top_k,
                retrieval.concurrency,
            ),
            scorer: HybridScorer::new(scoring.clone()),
            composer: ResultComposer::new(
                retrieval.incident_limit,
                retrieval.education_limit,
                retrieval.regulation_limit,
            ),
        }
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Sub-queries the retriever would run, without running them
    pub fn plan(&self, equipment: &Equipment, work_type: &WorkType) -> Result<QueryPlan, RetrievalError> {
        validate_input(equipment)?;
        let profile = self.catalog.resolve(equipment, work_type);
        Ok(self.builder.build(profile, equipment, work_type))
    }

    pub async fn retrieve(
        &self,
        equipment: &Equipment,
        work_type: &WorkType,
    ) -> Result<RetrievalResult, RetrievalError> {
        validate_input(equipment)?;

        let profile = self.catalog.resolve(equipment, work_type);
        let plan = self.builder.build(profile, equipment, work_type);
        let mut buckets = self.orchestrator.search(&plan.all_queries).await;

        let ctx = ScoringContext::new(profile, equipment, work_type);
        let mut accept = |category: Category| {
            let scored = self.scorer.score_all(&ctx, buckets.take(category));
            self.scorer.accept(category, scored)
        };
        let incidents = accept(Category::Incident);
        let education = accept(Category::Education);
        let regulations = accept(Category::Regulation);

        let result = self.composer.compose(&profile.id, incidents, education, regulations);
        info!(
            profile = %profile.id,
            equipment = %equipment.name,
            work_type = %work_type.name,
            queries = plan.all_queries.len(),
            incidents = result.incidents.len(),
            education = result.education.len(),
            regulations = result.regulations.len(),
            "Retrieval complete"
        );
        Ok(result)
    }
}

fn validate_input(equipment: &Equipment) -> Result<(), RetrievalError> {
    if equipment.name.trim().is_empty() {
        return Err(RetrievalError::InvalidInput(
            "equipment name must not be empty".to_string(),
        ));
    }
    Ok(())
}
