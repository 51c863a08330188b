//! Exponential backoff with jitter around provider calls.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{GenerationRequest, Generator, ProviderError};
use crate::metrics::METRICS;

/// Backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before the last error is returned (default: 10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay in milliseconds (default: 2000)
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    10
}

fn default_initial_delay_ms() -> u64 {
    2000
}

impl RetryPolicy {
    /// Delay before retrying after failed attempt `attempt` (0-based), without jitter.
    pub fn base_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let factor = 2u64.saturating_pow(attempt.min(20));
        let base = self.initial_delay_ms.saturating_mul(factor);
        let ms = if rate_limited {
            base.saturating_mul(2)
        } else {
            base
        };
        Duration::from_millis(ms)
    }

    /// Base delay plus up to 1s of jitter, or 5s for rate limits.
    pub fn delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let jitter_ms = if rate_limited {
            fastrand::u64(0..=5_000)
        } else {
            fastrand::u64(0..=1_000)
        };
        self.base_delay(attempt, rate_limited) + Duration::from_millis(jitter_ms)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts run out.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let attempts = policy.max_retries.max(1);
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_retryable() || attempt + 1 >= attempts => {
                warn!(label = %label, attempts = attempt + 1, error = %e, "provider call failed");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay(attempt, e.is_rate_limit());
                debug!(
                    label = %label,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "retrying provider call"
                );
                METRICS.inc_provider_retries();
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// [`Generator`] wrapper applying a [`RetryPolicy`] to every call.
pub struct RetryingGenerator<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generator> RetryingGenerator<G> {
    pub fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: Generator> Generator for RetryingGenerator<G> {
    async fn invoke(&self, request: &GenerationRequest) -> Result<String, ProviderError> {
        retry_with_backoff(&self.policy, &request.agent, || self.inner.invoke(request)).await
    }
}
