//! Retry policy for provider calls
//!
//! A pure backoff table: given the attempt number and the classified error,
//! decide whether to retry and how long to wait. The client owns the loop.

use std::time::Duration;

use super::ProviderError;
use crate::config::{defaults::RATE_LIMIT_MAX_BACKOFF_EXPONENT, EmbeddingConfig};

/// Outcome of consulting the policy after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded retry with an explicit backoff table.
///
/// - rate limited: `base * 2^attempt` plus up to `jitter` random delay
/// - transient: fixed `server_error_delay`
/// - fatal: never retried
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub rate_limit_base: Duration,
    pub rate_limit_jitter: Duration,
    pub server_error_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            rate_limit_base: Duration::from_millis(config.rate_limit_base_delay_ms),
            rate_limit_jitter: Duration::from_millis(config.rate_limit_jitter_ms),
            server_error_delay: Duration::from_millis(config.server_error_delay_ms),
        }
    }

    /// Policy with no waiting, for tests and offline runs.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            rate_limit_base: Duration::ZERO,
            rate_limit_jitter: Duration::ZERO,
            server_error_delay: Duration::ZERO,
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide after `attempt` (0-based) failed with `error`.
    pub fn decide(&self, attempt: u32, error: &ProviderError) -> RetryDecision {
        if attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        match error {
            ProviderError::Fatal(_) => RetryDecision::GiveUp,
            ProviderError::Transient(_) => RetryDecision::RetryAfter(self.server_error_delay),
            ProviderError::RateLimited(_) => {
                RetryDecision::RetryAfter(self.rate_limit_delay(attempt) + self.jitter())
            }
        }
    }

    /// Deterministic part of the rate-limit delay
    pub fn rate_limit_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.min(RATE_LIMIT_MAX_BACKOFF_EXPONENT);
        self.rate_limit_base.saturating_mul(factor)
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.rate_limit_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        use rand::Rng;
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EmbeddingConfig::default())
    }
}
