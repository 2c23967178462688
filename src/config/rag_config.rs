//! Retrieval engine configuration - every tunable as an operator-editable TOML value
//!
//! Each struct implements `Default` with the constants from `defaults.rs`,
//! so a missing or empty config file yields a working setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable pointing at a config file.
pub const CONFIG_ENV_VAR: &str = "SAFETY_RAG_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "rag_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration.
///
/// Load with `RagConfig::load()` which searches:
/// 1. `$SAFETY_RAG_CONFIG` env var
/// 2. `./rag_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagConfig {
    /// Profile catalog file; the built-in catalog is used when unset
    #[serde(default)]
    pub profiles_path: Option<PathBuf>,

    /// On-disk layout
    #[serde(default)]
    pub storage: StorageConfig,

    /// Embedding provider and retry behavior
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Sub-query fan-out and result limits
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Hybrid scorer caps, bonuses and acceptance thresholds
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Batch sizes and chunking
    #[serde(default)]
    pub ingestion: IngestionConfig,

    /// Source corpora
    #[serde(default)]
    pub sources: SourcesConfig,
}

impl RagConfig {
    /// Load configuration using the standard search order:
    /// 1. `$SAFETY_RAG_CONFIG` environment variable
    /// 2. `./rag_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./rag_config.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::ParseStr(e) => ConfigError::Parse(path.to_path_buf(), e),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        // Two-pass: check for unknown keys first (warnings only)
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents).map_err(ConfigError::ParseStr)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate ranges and internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (mut errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }

        let s = &self.scoring;
        for (name, value) in [
            ("scoring.include_bonus", s.include_bonus),
            ("scoring.exclude_penalty", s.exclude_penalty),
            ("scoring.acceptance_percentile", s.acceptance_percentile),
            ("scoring.default_ceiling", s.default_ceiling),
            ("scoring.education_ceiling", s.education_ceiling),
        ] {
            if !value.is_finite() {
                errors.push(format!("{name} must be a finite number (got {value})"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config parse error: {0}")]
    ParseStr(#[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[source] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding `index/`, `backup/`, the checkpoint and the lock
    #[serde(default = "default_base_path")]
    pub base_path: PathBuf,
}

fn default_base_path() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_BASE_PATH)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
        }
    }
}

// ============================================================================
// Embedding
// ============================================================================

/// Which embedding backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI-compatible `/embeddings` endpoint
    #[default]
    Openai,
    /// Gemini `embedContent` endpoint
    Gemini,
    /// Local hashing embedder, no network
    Hash,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Overrides the provider's public endpoint
    #[serde(default)]
    pub base_url: Option<String>,

    /// Environment variable holding the API key
    /// (`OPENAI_API_KEY` / `GEMINI_API_KEY` when unset)
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_rate_limit_base_delay_ms")]
    pub rate_limit_base_delay_ms: u64,

    #[serde(default = "default_rate_limit_jitter_ms")]
    pub rate_limit_jitter_ms: u64,

    #[serde(default = "default_server_error_delay_ms")]
    pub server_error_delay_ms: u64,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_dimension() -> usize { defaults::EMBEDDING_DIMENSION }
fn default_max_chars() -> usize { defaults::EMBEDDING_MAX_CHARS }
fn default_timeout_secs() -> u64 { defaults::EMBEDDING_TIMEOUT_SECS }
fn default_max_retries() -> u32 { defaults::EMBEDDING_MAX_RETRIES }
fn default_rate_limit_base_delay_ms() -> u64 { defaults::RATE_LIMIT_BASE_DELAY_MS }
fn default_rate_limit_jitter_ms() -> u64 { defaults::RATE_LIMIT_JITTER_MS }
fn default_server_error_delay_ms() -> u64 { defaults::SERVER_ERROR_DELAY_MS }

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            model: default_embedding_model(),
            base_url: None,
            api_key_env: None,
            dimension: default_dimension(),
            max_chars: default_max_chars(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            rate_limit_base_delay_ms: default_rate_limit_base_delay_ms(),
            rate_limit_jitter_ms: default_rate_limit_jitter_ms(),
            server_error_delay_ms: default_server_error_delay_ms(),
        }
    }
}

// ============================================================================
// Retrieval
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Neighbours fetched per sub-query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Sub-queries in flight per request
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Tokens kept in the synthesized per-category query
    #[serde(default = "default_synthesized_query_tokens")]
    pub synthesized_query_tokens: usize,

    #[serde(default = "default_results_per_category")]
    pub incident_limit: usize,

    #[serde(default = "default_results_per_category")]
    pub education_limit: usize,

    #[serde(default = "default_results_per_category")]
    pub regulation_limit: usize,
}

fn default_top_k() -> usize { defaults::RETRIEVAL_TOP_K }
fn default_concurrency() -> usize { defaults::RETRIEVAL_CONCURRENCY }
fn default_synthesized_query_tokens() -> usize { defaults::SYNTHESIZED_QUERY_TOKENS }
fn default_results_per_category() -> usize { defaults::RESULTS_PER_CATEGORY }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            concurrency: default_concurrency(),
            synthesized_query_tokens: default_synthesized_query_tokens(),
            incident_limit: default_results_per_category(),
            education_limit: default_results_per_category(),
            regulation_limit: default_results_per_category(),
        }
    }
}

// ============================================================================
// Scoring
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_keyword_cap")]
    pub keyword_cap: usize,

    #[serde(default = "default_equipment_cap")]
    pub equipment_cap: usize,

    #[serde(default = "default_work_type_cap")]
    pub work_type_cap: usize,

    #[serde(default = "default_risk_cap")]
    pub risk_cap: usize,

    #[serde(default = "default_include_bonus")]
    pub include_bonus: f64,

    #[serde(default = "default_exclude_penalty")]
    pub exclude_penalty: f64,

    /// Share of a category batch the percentile threshold keeps
    #[serde(default = "default_acceptance_percentile")]
    pub acceptance_percentile: f64,

    /// Threshold ceiling for incident and regulation batches
    #[serde(default = "default_ceiling")]
    pub default_ceiling: f64,

    #[serde(default = "default_education_ceiling")]
    pub education_ceiling: f64,
}

fn default_keyword_cap() -> usize { defaults::KEYWORD_CAP }
fn default_equipment_cap() -> usize { defaults::EQUIPMENT_CAP }
fn default_work_type_cap() -> usize { defaults::WORK_TYPE_CAP }
fn default_risk_cap() -> usize { defaults::RISK_CAP }
fn default_include_bonus() -> f64 { defaults::INCLUDE_BONUS }
fn default_exclude_penalty() -> f64 { defaults::EXCLUDE_PENALTY }
fn default_acceptance_percentile() -> f64 { defaults::ACCEPTANCE_PERCENTILE }
fn default_ceiling() -> f64 { defaults::DEFAULT_SCORE_CEILING }
fn default_education_ceiling() -> f64 { defaults::EDUCATION_SCORE_CEILING }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            keyword_cap: default_keyword_cap(),
            equipment_cap: default_equipment_cap(),
            work_type_cap: default_work_type_cap(),
            risk_cap: default_risk_cap(),
            include_bonus: default_include_bonus(),
            exclude_penalty: default_exclude_penalty(),
            acceptance_percentile: default_acceptance_percentile(),
            default_ceiling: default_ceiling(),
            education_ceiling: default_education_ceiling(),
        }
    }
}

// ============================================================================
// Ingestion
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_incident_batch_size")]
    pub incident_batch_size: usize,

    #[serde(default = "default_education_batch_size")]
    pub education_batch_size: usize,

    #[serde(default = "default_regulation_batch_size")]
    pub regulation_batch_size: usize,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

fn default_incident_batch_size() -> usize { defaults::INCIDENT_BATCH_SIZE }
fn default_education_batch_size() -> usize { defaults::EDUCATION_BATCH_SIZE }
fn default_regulation_batch_size() -> usize { defaults::REGULATION_BATCH_SIZE }
fn default_chunk_size() -> usize { defaults::CHUNK_SIZE }
fn default_chunk_overlap() -> usize { defaults::CHUNK_OVERLAP }

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            incident_batch_size: default_incident_batch_size(),
            education_batch_size: default_education_batch_size(),
            regulation_batch_size: default_regulation_batch_size(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

// ============================================================================
// Sources
// ============================================================================

/// Source corpora. Unset entries are treated as empty corpora.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// JSON array of incident records
    #[serde(default)]
    pub incidents: Option<PathBuf>,

    /// JSON array of education records
    #[serde(default)]
    pub education: Option<PathBuf>,

    /// JSON array of articles, or raw statute text (`.txt`)
    #[serde(default)]
    pub regulations: Option<PathBuf>,

    #[serde(default = "default_regulation_source_name")]
    pub regulation_source_name: String,
}

fn default_regulation_source_name() -> String {
    defaults::REGULATION_SOURCE_NAME.to_string()
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            incidents: None,
            education: None,
            regulations: None,
            regulation_source_name: default_regulation_source_name(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
