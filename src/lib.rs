//! Safety briefing retrieval engine
//!
//! Turns an equipment / work-type pair into ranked accident cases,
//! regulation articles and training material, backed by a locally
//! persisted embedding index.
//!
//! ## Architecture
//!
//! - **Embedding**: provider access with timeout, retry and backoff
//! - **Storage**: sled vector index with snapshots and a process lock
//! - **Ingestion**: checkpointed, resumable bulk loading of the corpora
//! - **Profile**: declarative profile catalog and resolver
//! - **Retrieval**: query building, concurrent search, hybrid scoring and
//!   result composition

pub mod config;
pub mod embedding;
pub mod ingestion;
pub mod profile;
pub mod retrieval;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{ConfigError, RagConfig};

// Re-export commonly used types
pub use types::{
    Category, Document, DocumentDetail, Equipment, IngestSummary, IngestionCheckpoint, Profile,
    RiskFactor, WorkType,
};

// Re-export the engine surfaces
pub use embedding::{EmbedMode, EmbeddingClient, EmbeddingError, EmbeddingProvider, HashEmbedder};
pub use ingestion::{IngestError, IngestStatus, IngestionPipeline, SourceCorpus};
pub use profile::{ProfileCatalog, ProfileError};
pub use retrieval::{RetrievalError, RetrievalResult, RetrievedDocument, SafetyRetriever};
pub use storage::{StorageLayout, StoreError, VectorSearch, VectorStore};
