//! System-wide default constants.
//!
//! Centralises the tunables that seed `RagConfig` defaults.
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Storage
// ============================================================================

/// Base directory holding the index, backup, checkpoint and lock file.
pub const DEFAULT_BASE_PATH: &str = "./data/safety_rag";

/// Subdirectory of the base path holding the sled index.
pub const INDEX_DIR: &str = "index";

/// Subdirectory of the base path holding the index snapshot.
pub const BACKUP_DIR: &str = "backup";

/// File name of the compressed index snapshot.
pub const BACKUP_FILE: &str = "index_snapshot.json.zst";

/// File name of the ingestion checkpoint.
pub const CHECKPOINT_FILE: &str = "ingest_checkpoint.json";

/// File name of the ingestion process lock.
pub const LOCK_FILE: &str = ".ingest.lock";

/// zstd level for index snapshots.
pub const BACKUP_ZSTD_LEVEL: i32 = 3;

// ============================================================================
// Embedding
// ============================================================================

/// Output dimension of `text-embedding-3-small`.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Characters sent to the provider per text (longer input is truncated).
pub const EMBEDDING_MAX_CHARS: usize = 8_000;

/// Per-call timeout for a single provider request (seconds).
pub const EMBEDDING_TIMEOUT_SECS: u64 = 30;

/// Retries after the first attempt for rate-limit and server errors.
pub const EMBEDDING_MAX_RETRIES: u32 = 3;

/// Base delay for rate-limit backoff (ms). Doubles per attempt.
pub const RATE_LIMIT_BASE_DELAY_MS: u64 = 1_000;

/// Maximum random jitter added to a rate-limit delay (ms).
pub const RATE_LIMIT_JITTER_MS: u64 = 500;

/// Fixed delay after a transient server error (ms).
pub const SERVER_ERROR_DELAY_MS: u64 = 5_000;

/// Maximum backoff exponent for rate-limit retries.
///
/// `2^6 = 64x` the base delay.
pub const RATE_LIMIT_MAX_BACKOFF_EXPONENT: u32 = 6;

// ============================================================================
// Retrieval
// ============================================================================

/// Neighbours fetched per sub-query.
pub const RETRIEVAL_TOP_K: usize = 15;

/// Sub-queries in flight per request.
pub const RETRIEVAL_CONCURRENCY: usize = 6;

/// Tokens kept from the synthesized per-category query.
pub const SYNTHESIZED_QUERY_TOKENS: usize = 12;

/// Results kept per category after ranking.
pub const RESULTS_PER_CATEGORY: usize = 5;

// ============================================================================
// Scoring
// ============================================================================

/// Keyword hits counted towards the keyword signal.
pub const KEYWORD_CAP: usize = 8;

/// Equipment token hits counted towards the equipment signal.
pub const EQUIPMENT_CAP: usize = 4;

/// Work-type token hits counted towards the work-type signal.
pub const WORK_TYPE_CAP: usize = 3;

/// Risk-tag hits counted towards the risk signal.
pub const RISK_CAP: usize = 3;

/// Bonus when any `include_if_any` term is present.
pub const INCLUDE_BONUS: f64 = 0.05;

/// Penalty when any exclusion term is present.
pub const EXCLUDE_PENALTY: f64 = 0.5;

/// Share of a category batch kept by the percentile threshold.
pub const ACCEPTANCE_PERCENTILE: f64 = 0.30;

/// Threshold ceiling for incident and regulation batches.
pub const DEFAULT_SCORE_CEILING: f64 = 0.35;

/// Threshold ceiling for education batches.
pub const EDUCATION_SCORE_CEILING: f64 = 0.25;

// ============================================================================
// Ingestion
// ============================================================================

/// Incidents per commit + checkpoint.
pub const INCIDENT_BATCH_SIZE: usize = 10;

/// Education items per commit + checkpoint.
pub const EDUCATION_BATCH_SIZE: usize = 50;

/// Regulation chunks per commit + checkpoint.
pub const REGULATION_BATCH_SIZE: usize = 25;

/// Maximum characters per chunk.
pub const CHUNK_SIZE: usize = 1_000;

/// Characters shared between consecutive chunks.
pub const CHUNK_OVERLAP: usize = 100;

/// Source name recorded on regulation chunks.
pub const REGULATION_SOURCE_NAME: &str = "Occupational Safety and Health Standards Rules";
