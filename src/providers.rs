//! External provider seams: embeddings and answer generation.
//!
//! The engine never talks to a model directly. Callers hand it an
//! [`EmbeddingProvider`] and an [`AnswerGenerator`]; both may be slow or
//! unavailable, so embedding calls go through [`embed_with_retry`], which
//! applies a bounded timeout plus a small number of exponential-backoff
//! retries, and never hold the index lock.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors raised by external providers.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the call or could not be reached. Retryable.
    #[error("provider unavailable: {0}")]
    Unavailable(String),

    /// The call exceeded its bounded timeout. Retryable.
    #[error("provider call timed out after {elapsed_ms}ms")]
    Timeout {
        /// Milliseconds elapsed before the call was abandoned.
        elapsed_ms: u64,
    },

    /// Answer generation failed. Not retried by the engine.
    #[error("answer generation failed: {0}")]
    GenerationFailed(String),
}

impl ProviderError {
    /// Whether retrying the same call can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Unavailable(_) | ProviderError::Timeout { .. }
        )
    }
}

/// Maps text to a fixed-dimension embedding vector.
///
/// The dimension is declared at construction time and must not change for
/// the provider's lifetime; the index is built against it.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identity of this provider (model name/revision). Persisted
    /// with the index so a snapshot is never mixed with foreign vectors.
    fn id(&self) -> &str;

    /// Fixed dimensionality of the vectors this provider produces.
    fn dimensions(&self) -> usize;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// Generates an answer from a fully assembled prompt.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate a reply for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Timeout and retry policy for provider calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Base backoff in milliseconds; doubles after each failed attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_base_ms() -> u64 {
    200
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            timeout_ms: default_timeout_ms(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RetryPolicy {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Backoff before the given retry (1-based attempt that just failed).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.saturating_sub(1).min(16);
        Duration::from_millis(self.backoff_base_ms.saturating_mul(factor))
    }
}

/// Embed `text`, applying the policy's timeout and retrying retryable
/// failures with exponential backoff.
///
/// Repeated failure surfaces as the last typed error instead of hanging
/// the caller.
pub async fn embed_with_retry(
    provider: &dyn EmbeddingProvider,
    text: &str,
    policy: &RetryPolicy,
) -> Result<Vec<f32>, ProviderError> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let outcome = tokio::time::timeout(policy.timeout(), provider.embed(text)).await;
        let error = match outcome {
            Ok(Ok(vector)) => return Ok(vector),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Timeout {
                elapsed_ms: policy.timeout_ms,
            },
        };

        if !error.is_retryable() || attempt >= max_attempts {
            return Err(error);
        }

        let backoff = policy.backoff(attempt);
        warn!(attempt, error = %error, backoff_ms = backoff.as_millis() as u64, "Embedding call failed, retrying");
        tokio::time::sleep(backoff).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails a configurable number of times before succeeding.
    struct FlakyProvider {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ProviderError::Unavailable("transient".to_string()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            timeout_ms: 1_000,
            backoff_base_ms: 1,
        }
    }

    #[tokio::test]
    async fn test_retry_recovers_from_transient_failure() {
        let provider = FlakyProvider {
            failures: 2,
            calls: AtomicU32::new(0),
        };
        let vector = embed_with_retry(&provider, "x", &fast_policy(3))
            .await
            .unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_attempts() {
        let provider = FlakyProvider {
            failures: 10,
            calls: AtomicU32::new(0),
        };
        let err = embed_with_retry(&provider, "x", &fast_policy(2))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Unavailable(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        struct HangingProvider;

        #[async_trait]
        impl EmbeddingProvider for HangingProvider {
            fn id(&self) -> &str {
                "hanging"
            }

            fn dimensions(&self) -> usize {
                2
            }

            async fn embed(&self, _text: &str) -> Result<Vec<f32>, ProviderError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(vec![0.0, 0.0])
            }
        }

        let policy = RetryPolicy {
            max_attempts: 1,
            timeout_ms: 20,
            backoff_base_ms: 1,
        };
        let err = embed_with_retry(&HangingProvider, "x", &policy)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Timeout { .. }));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = fast_policy(5);
        assert_eq!(policy.backoff(1).as_millis(), 1);
        assert_eq!(policy.backoff(2).as_millis(), 2);
        assert_eq!(policy.backoff(3).as_millis(), 4);
    }
}
