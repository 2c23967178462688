//! Shared data types for the retrieval engine

pub mod checkpoint;
pub mod document;
pub mod equipment;
pub mod profile;

pub use checkpoint::{IngestSummary, IngestionCheckpoint};
pub use document::{
    Category, Document, DocumentDetail, EducationDetail, IncidentDetail, RegulationDetail,
};
pub use equipment::{Equipment, RiskFactor, WorkType};
pub use profile::{CategoryQueries, MatchRules, Profile, ProfileCatalogFile, ScoreWeights};
