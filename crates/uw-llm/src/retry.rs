//! Bounded retry with backoff and jitter for generative calls.
//!
//! Delay before retry `n` (1-based) is `base_n + jitter`, where `jitter` is
//! drawn uniformly from `[0, jitter_n]`. With the default schedule and a 1 s
//! unit, the first retry waits 2–4 s and the second 6–10 s. A rate-limited
//! reply waits at least its `Retry-After`. Errors for which
//! [`LlmError::is_retryable`] is false are returned immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uw_config::{BackoffStep, RetryConfig};

use crate::Generative;
use crate::error::LlmError;

/// Retry schedule resolved from [`RetryConfig`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    unit: Duration,
    schedule: Vec<BackoffStep>,
}

impl RetryPolicy {
    #[must_use]
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            unit: Duration::from_millis(config.unit_ms),
            schedule: config.schedule.clone(),
        }
    }

    /// Default schedule scaled to `unit`, for tests and tools that must not
    /// sleep for seconds.
    #[must_use]
    pub fn with_unit(unit: Duration) -> Self {
        Self {
            unit,
            ..Self::from_config(&RetryConfig::default())
        }
    }

    /// No retries at all.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            unit: Duration::ZERO,
            schedule: Vec::new(),
        }
    }

    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// `(minimum, maximum)` delay before retry `retry` (1-based). Retries past
    /// the end of the schedule reuse its last step.
    #[must_use]
    pub fn delay_bounds(&self, retry: u32) -> (Duration, Duration) {
        let idx = usize::try_from(retry.saturating_sub(1)).unwrap_or(usize::MAX);
        let Some(step) = self.schedule.get(idx).or_else(|| self.schedule.last()) else {
            return (Duration::ZERO, Duration::ZERO);
        };
        let base = self.unit * step.base_units;
        (base, base + self.unit * step.jitter_units)
    }

    /// Delay before retry `retry`, with jitter.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let (min, max) = self.delay_bounds(retry);
        let span = u64::try_from((max - min).as_millis()).unwrap_or(u64::MAX);
        if span == 0 {
            return min;
        }
        // A failed entropy read only loses the jitter.
        let roll = getrandom::u64().unwrap_or(0) % (span + 1);
        min + Duration::from_millis(roll)
    }

    /// Delay before retry `retry` after `err`. A provider's `Retry-After`
    /// is a floor under the jittered schedule.
    #[must_use]
    pub fn delay_after(&self, retry: u32, err: &LlmError) -> Duration {
        let delay = self.delay_for(retry);
        match err {
            LlmError::RateLimited { retry_after_secs } => {
                delay.max(Duration::from_secs(*retry_after_secs))
            }
            _ => delay,
        }
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. Returns the last error on exhaustion.
    ///
    /// # Errors
    ///
    /// The first non-retryable error, or the last error after all retries.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut retry = 0;
        loop {
            match op().await {
                Ok(value) => {
                    if retry > 0 {
                        tracing::info!(operation, attempts = retry + 1, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::warn!(operation, error = %e, "non-retryable failure");
                    return Err(e);
                }
                Err(e) if retry >= self.max_retries => {
                    tracing::warn!(operation, attempts = retry + 1, error = %e, "retries exhausted");
                    return Err(e);
                }
                Err(e) => {
                    retry += 1;
                    let delay = self.delay_after(retry, &e);
                    tracing::warn!(
                        operation,
                        attempt = retry,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// A [`Generative`] that retries its inner client per [`RetryPolicy`].
pub struct RetryingGenerative<G> {
    inner: G,
    policy: RetryPolicy,
}

impl<G: Generative> RetryingGenerative<G> {
    pub const fn new(inner: G, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<G: Generative> Generative for RetryingGenerative<G> {
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, LlmError> {
        self.policy
            .run("complete", || self.inner.complete(prompt, max_tokens))
            .await
    }
}
