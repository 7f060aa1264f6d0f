//! Timeout and retry policy for provider calls.
//!
//! Transient failures are retried with exponential backoff; permanent
//! failures surface immediately. The per-call timeout bounds the whole
//! logical call, retries included, and surfaces as a transient
//! `ProviderError`.

use super::client::{ResearchModel, SearchOptions, SearchProvider, SearchResponse};
use crate::types::{AppError, Result};
use crate::utils::toml_config::ResearchConfig;
use std::time::Duration;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::{sleep, timeout};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ResearchConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &ResearchConfig) -> Self {
        Self {
            max_retries: config.retry_count,
            base_delay: config.retry_base_delay(),
            call_timeout: config.call_timeout(),
        }
    }

    /// Backoff before retry number `retry` (0-based): `base · 2^retry`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << retry.min(16))
    }
}

/// Call the provider under `policy`.
pub async fn call_provider(
    provider: &dyn SearchProvider,
    query: &str,
    model: ResearchModel,
    options: &SearchOptions,
    policy: &RetryPolicy,
) -> Result<SearchResponse> {
    call_provider_gated(provider, query, model, options, policy, None).await
}

/// Like [`call_provider`], but each attempt holds a permit from `gate`.
///
/// The permit is released during backoff so a retrying caller does not
/// block other callers of the same gate. Only the wait for the first permit
/// falls outside the call timeout.
pub async fn call_provider_gated(
    provider: &dyn SearchProvider,
    query: &str,
    model: ResearchModel,
    options: &SearchOptions,
    policy: &RetryPolicy,
    gate: Option<&Semaphore>,
) -> Result<SearchResponse> {
    let mut _permit = acquire(gate).await?;
    let attempts = async move {
        let mut retry = 0;
        loop {
            match provider.search(query, model, options).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retry < policy.max_retries => {
                    let delay = policy.delay_for(retry);
                    warn!(
                        provider = provider.name(),
                        model = model.as_str(),
                        attempt = retry + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Transient provider error, retrying: {}",
                        e
                    );
                    _permit = None;
                    sleep(delay).await;
                    _permit = acquire(gate).await?;
                    retry += 1;
                }
                Err(e) => return Err(e),
            }
        }
    };

    // The whole budget is spent, so the transient error is final here.
    timeout(policy.call_timeout, attempts).await.map_err(|_| {
        AppError::transient(format!(
            "{} call timed out after {}ms",
            model.as_str(),
            policy.call_timeout.as_millis()
        ))
    })?
}

async fn acquire(gate: Option<&Semaphore>) -> Result<Option<SemaphorePermit<'_>>> {
    match gate {
        Some(gate) => gate
            .acquire()
            .await
            .map(Some)
            .map_err(|_| AppError::Internal("Provider gate closed".to_string())),
        None => Ok(None),
    }
}
