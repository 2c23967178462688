//! Resilient embedding client
//!
//! Wraps a provider with input truncation, a per-call timeout, the bounded
//! retry loop driven by `RetryPolicy`, and a dimension check on the output.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    EmbedMode, EmbeddingError, EmbeddingProvider, ProviderError, RetryDecision, RetryPolicy,
};
use crate::config::EmbeddingConfig;

#[derive(Clone)]
pub struct EmbeddingClient {
    provider: Arc<dyn EmbeddingProvider>,
    policy: RetryPolicy,
    dimension: usize,
    max_chars: usize,
    timeout: Duration,
}

impl std::fmt::Debug for EmbeddingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingClient")
            .field("provider", &self.provider.name())
            .field("dimension", &self.dimension)
            .field("max_chars", &self.max_chars)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EmbeddingClient {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        policy: RetryPolicy,
        dimension: usize,
        max_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy,
            dimension,
            max_chars,
            timeout,
        }
    }

    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &EmbeddingConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::from_config(config),
            config.dimension,
            config.max_chars,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Embed `text` in `mode`.
    ///
    /// Rate-limit and transient failures (including timeouts) are retried per
    /// the policy; exhausting retries yields `EmbeddingError::Unavailable`.
    pub async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>, EmbeddingError> {
        let text = truncate_chars(text, self.max_chars);
        let mut attempt: u32 = 0;

        loop {
            let outcome = match tokio::time::timeout(
                self.timeout,
                self.provider.embed(text, mode, self.dimension),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Transient(format!(
                    "timed out after {}ms",
                    self.timeout.as_millis()
                ))),
            };

            let error = match outcome {
                Ok(vector) => {
                    if vector.len() != self.dimension {
                        return Err(EmbeddingError::DimensionMismatch {
                            expected: self.dimension,
                            actual: vector.len(),
                        });
                    }
                    if attempt > 0 {
                        debug!(attempt, provider = self.provider.name(), "Embedding succeeded after retry");
                    }
                    return Ok(vector);
                }
                Err(e) => e,
            };

            match self.policy.decide(attempt, &error) {
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        error = %error,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts(),
                        next_retry_ms = delay.as_millis() as u64,
                        "Embedding call failed, backing off"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp if error.is_retryable() => {
                    return Err(EmbeddingError::Unavailable {
                        attempts: attempt + 1,
                        last_error: error.to_string(),
                    });
                }
                RetryDecision::GiveUp => return Err(EmbeddingError::Fatal(error.to_string())),
            }
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Provider that replays scripted outcomes, then succeeds.
    struct ScriptedProvider {
        script: Mutex<VecDeque<ProviderError>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
        output_len: usize,
    }

    impl ScriptedProvider {
        fn new(errors: Vec<ProviderError>, output_len: usize) -> Self {
            Self {
                script: Mutex::new(errors.into()),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
                output_len,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        async fn embed(
            &self,
            text: &str,
            _mode: EmbedMode,
            _dimension: usize,
        ) -> Result<Vec<f32>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(text.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(e) => Err(e),
                None => Ok(vec![0.5; self.output_len]),
            }
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _: &str, _: EmbedMode, d: usize) -> Result<Vec<f32>, ProviderError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![0.0; d])
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    fn client(provider: Arc<dyn EmbeddingProvider>, dim: usize) -> EmbeddingClient {
        EmbeddingClient::new(provider, RetryPolicy::immediate(3), dim, 20, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_rate_limit_then_success() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![
                ProviderError::RateLimited("429".into()),
                ProviderError::Transient("503".into()),
            ],
            4,
        ));
        let c = client(provider.clone(), 4);
        let v = c.embed("hello", EmbedMode::Query).await.expect("recovers");
        assert_eq!(v.len(), 4);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_unavailable() {
        let errors = (0..10).map(|_| ProviderError::Transient("502".into())).collect();
        let provider = Arc::new(ScriptedProvider::new(errors, 4));
        let c = client(provider.clone(), 4);
        let err = c.embed("hello", EmbedMode::Document).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Unavailable { attempts: 4, .. }));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_fatal_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            vec![ProviderError::Fatal("401".into())],
            4,
        ));
        let c = client(provider.clone(), 4);
        let err = c.embed("hello", EmbedMode::Query).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::Fatal(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_fatal() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new(), 3));
        let c = client(provider.clone(), 4);
        let err = c.embed("hello", EmbedMode::Query).await.unwrap_err();
        assert_eq!(err, EmbeddingError::DimensionMismatch { expected: 4, actual: 3 });
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_input_truncated_on_char_boundary() {
        let provider = Arc::new(ScriptedProvider::new(Vec::new(), 4));
        let c = client(provider.clone(), 4);
        let text = "가".repeat(50);
        c.embed(&text, EmbedMode::Document).await.expect("ok");
        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].chars().count(), 20);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient() {
        let c = EmbeddingClient::new(
            Arc::new(SlowProvider),
            RetryPolicy::immediate(1),
            8,
            100,
            Duration::from_millis(20),
        );
        let err = c.embed("hello", EmbedMode::Query).await.unwrap_err();
        match err {
            EmbeddingError::Unavailable { attempts, last_error } => {
                assert_eq!(attempts, 2);
                assert!(last_error.contains("timed out"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_hash_provider_through_client() {
        let c = client(Arc::new(HashEmbedder::new()), 32);
        let a = c.embed("arc flash", EmbedMode::Document).await.unwrap();
        let b = c.embed("arc flash", EmbedMode::Query).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        assert_eq!(truncate_chars("ab", 3), "ab");
        assert_eq!(truncate_chars("안전보건", 2), "안전");
    }
}
