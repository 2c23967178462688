//! Embedding client and providers
//!
//! Text becomes a fixed-length vector through an `EmbeddingProvider`.
//! `EmbeddingClient` wraps a provider with truncation, a per-call timeout,
//! a bounded retry loop and a dimension check.
//!
//! ## Providers
//!
//! - `HttpEmbeddingProvider`: OpenAI- or Gemini-compatible HTTP endpoint
//! - `HashEmbedder`: deterministic local embedder for offline use and tests

mod client;
mod hashing;
mod http;
mod retry;

pub use client::EmbeddingClient;
pub(crate) use client::truncate_chars;
pub use hashing::HashEmbedder;
pub use http::{HttpEmbeddingProvider, HttpFlavor};
pub use retry::{RetryDecision, RetryPolicy};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{EmbeddingConfig, ProviderKind};

// ============================================================================
// Error Types
// ============================================================================

/// Classified failure of a single provider call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// 429 or equivalent quota rejection
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// 5xx, connection reset, timeout
    #[error("Transient provider failure: {0}")]
    Transient(String),

    /// Authentication, bad request, malformed response
    #[error("Provider error: {0}")]
    Fatal(String),
}

impl ProviderError {
    /// Classify an HTTP status code returned by a provider.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => ProviderError::RateLimited(message),
            408 | 500..=599 => ProviderError::Transient(message),
            _ => ProviderError::Fatal(format!("status {status}: {message}")),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ProviderError::RateLimited(_) | ProviderError::Transient(_))
    }
}

/// Failure of `EmbeddingClient::embed` after retries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("Embedding provider unavailable after {attempts} attempts: {last_error}")]
    Unavailable { attempts: u32, last_error: String },

    #[error("Embedding failed: {0}")]
    Fatal(String),

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

// ============================================================================
// Provider Trait
// ============================================================================

/// Whether text is embedded for storage or for search.
///
/// Some providers use asymmetric task types; both modes target the same
/// dimensionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedMode {
    Document,
    Query,
}

/// Embedding backend.
///
/// Every implementation must be thread-safe (Send + Sync) since the
/// orchestrator runs several sub-queries concurrently against one provider.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one text. Implementations do not retry; the client does.
    async fn embed(
        &self,
        text: &str,
        mode: EmbedMode,
        dimension: usize,
    ) -> Result<Vec<f32>, ProviderError>;

    /// Provider name for logging
    fn name(&self) -> &'static str;
}

/// Build the provider selected in the config.
///
/// HTTP providers read their API key from `config.api_key_env`.
pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<std::sync::Arc<dyn EmbeddingProvider>, EmbeddingError> {
    let provider: std::sync::Arc<dyn EmbeddingProvider> = match config.provider {
        ProviderKind::Hash => std::sync::Arc::new(HashEmbedder::new()),
        ProviderKind::Openai => std::sync::Arc::new(HttpEmbeddingProvider::from_config(
            HttpFlavor::OpenAi,
            config,
        )?),
        ProviderKind::Gemini => std::sync::Arc::new(HttpEmbeddingProvider::from_config(
            HttpFlavor::Gemini,
            config,
        )?),
    };
    Ok(provider)
}

/// Cosine similarity of two vectors; 0.0 for mismatched or zero-length input.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (l, r) in left.iter().zip(right.iter()) {
        let (l, r) = (f64::from(*l), f64::from(*r));
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }
    dot / (left_norm.sqrt() * right_norm.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "overloaded"),
            ProviderError::Transient(_)
        ));
        assert!(matches!(
            ProviderError::from_status(401, "bad key"),
            ProviderError::Fatal(_)
        ));
        assert!(!ProviderError::from_status(400, "too long").is_retryable());
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = [1.0_f32, 0.0, 0.0];
        let b = [1.0_f32, 0.0, 0.0];
        let c = [-1.0_f32, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-9);
        assert!((cosine_similarity(&a, &c) + 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0; 3], &a), 0.0);
    }

    #[test]
    fn test_hash_provider_needs_no_key() {
        let config = EmbeddingConfig {
            provider: ProviderKind::Hash,
            ..Default::default()
        };
        let provider = provider_from_config(&config).expect("hash provider");
        assert_eq!(provider.name(), "hash");
    }
}
