use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use super::{Completion, LanguageModel, Prompt};

/// How often a failed model call is repeated before the error is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Wait before the second attempt (doubles each retry).
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// `max_attempts` tries with no waiting in between.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

/// Wraps a model so each `generate` call is retried under a [`RetryPolicy`].
pub struct Retrying<M> {
    inner: M,
    policy: RetryPolicy,
}

impl<M> Retrying<M> {
    pub fn new(inner: M, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl<M: LanguageModel> LanguageModel for Retrying<M> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &Prompt, max_tokens: u32) -> Result<Completion> {
        let attempts = self.policy.max_attempts.max(1);
        let mut backoff = self.policy.initial_backoff;
        let mut last_err = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(self.policy.max_backoff);
            }

            match self.inner.generate(prompt, max_tokens).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    warn!(
                        model = %self.inner.name(),
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Model call failed"
                    );
                    last_err = Some(e);
                }
            }
        }

        let err = last_err.unwrap_or_else(|| anyhow!("no attempt was made"));
        Err(err.context(format!(
            "{} failed after {} attempts",
            self.inner.name(),
            attempts
        )))
    }
}
