//! Retrieval Orchestrator
//!
//! Runs sub-queries through a bounded stream (`buffered`, so results come
//! back in query order), drops failed sub-queries, dedups hits by id with
//! the first occurrence winning, and partitions them by category.

use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::embedding::{EmbedMode, EmbeddingClient};
use crate::storage::{SearchHit, VectorSearch};
use crate::types::{Category, Document};

/// A retrieved document with its raw similarity, before scoring
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document: Document,
    pub vector_score: f64,
}

/// Candidates partitioned by category, each in retrieval order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryBuckets {
    pub incidents: Vec<Candidate>,
    pub education: Vec<Candidate>,
    pub regulations: Vec<Candidate>,
}

impl CategoryBuckets {
    pub fn push(&mut self, candidate: Candidate) {
        match candidate.document.category() {
            Category::Incident => self.incidents.push(candidate),
            Category::Education => self.education.push(candidate),
            Category::Regulation => self.regulations.push(candidate),
        }
    }

    pub fn get(&self, category: Category) -> &[Candidate] {
        match category {
            Category::Incident => &self.incidents,
            Category::Education => &self.education,
            Category::Regulation => &self.regulations,
        }
    }

    pub fn take(&mut self, category: Category) -> Vec<Candidate> {
        match category {
            Category::Incident => std::mem::take(&mut self.incidents),
            Category::Education => std::mem::take(&mut self.education),
            Category::Regulation => std::mem::take(&mut self.regulations),
        }
    }

    pub fn len(&self) -> usize {
        self.incidents.len() + self.education.len() + self.regulations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct RetrievalOrchestrator {
    embedder: EmbeddingClient,
    index: Arc<dyn VectorSearch>,
    top_k: usize,
    concurrency: usize,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: EmbeddingClient,
        index: Arc<dyn VectorSearch>,
        top_k: usize,
        concurrency: usize,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn search(&self, queries: &[String]) -> CategoryBuckets {
        let results: Vec<Option<Vec<SearchHit>>> = stream::iter(queries)
            .map(|query| self.run_query(query))
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut seen: HashSet<String> = HashSet::new();
        let mut buckets = CategoryBuckets::default();
        let mut failed = 0usize;
        for hits in results {
            let Some(hits) = hits else {
                failed += 1;
                continue;
            };
            for hit in hits {
                if seen.insert(hit.id) {
                    buckets.push(Candidate {
                        document: hit.document,
                        vector_score: hit.score,
                    });
                }
            }
        }

        debug!(
            queries = queries.len(),
            failed,
            candidates = buckets.len(),
            incidents = buckets.incidents.len(),
            education = buckets.education.len(),
            regulations = buckets.regulations.len(),
            "Sub-queries complete"
        );
        buckets
    }

    /// One sub-query; `None` when it failed and was skipped.
    async fn run_query(&self, query: &str) -> Option<Vec<SearchHit>> {
        let vector = match self.embedder.embed(query, EmbedMode::Query).await {
            Ok(v) => v,
            Err(e) => {
                warn!(query, error = %e, "Skipping sub-query: embedding failed");
                return None;
            }
        };

        let index = Arc::clone(&self.index);
        let k = self.top_k;
        match tokio::task::spawn_blocking(move || index.search(&vector, k)).await {
            Ok(Ok(hits)) => Some(hits),
            Ok(Err(e)) => {
                warn!(query, error = %e, "Skipping sub-query: index search failed");
                None
            }
            Err(e) => {
                warn!(query, error = %e, "Skipping sub-query: search task failed");
                None
            }
        }
    }
}
