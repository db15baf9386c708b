//! Free/busy fetching with batching and bounded exponential backoff.
//!
//! Calendar addresses are split into batches that are queried independently.
//! Each batch is retried on transient failures only; a batch that still
//! fails degrades to empty busy lists for its calendars instead of aborting
//! the whole fetch.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{StreamExt, stream};
use roomboard_core::TimeWindow;
use roomboard_providers::{BusyMap, FreeBusySource, ProviderError};
use thiserror::Error;
use tracing::{debug, warn};

use crate::scheduler::jitter_unit;

/// Calendars per free/busy request unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 40;

/// Retry policy for transient upstream failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Up to `max_retries` retries, `base_delay` before the first one.
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: 0.0,
        }
    }

    /// Builder: cap a single delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Builder: add up to `fraction` of the delay at random.
    pub fn with_jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `retry` (1-based): `base * 2^(retry-1)`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(31);
        let delay = self
            .base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay);
        if self.jitter > 0.0 {
            delay + delay.mul_f64(self.jitter * jitter_unit())
        } else {
            delay
        }
    }
}

/// A free/busy batch that could not be fetched.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Transient failures outlasted the retry budget.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: ProviderError },

    /// A failure that retrying cannot fix.
    #[error("{source}")]
    Permanent { source: ProviderError },
}

impl UpstreamError {
    pub fn provider_error(&self) -> &ProviderError {
        match self {
            Self::Exhausted { source, .. } | Self::Permanent { source } => source,
        }
    }

    /// Returns true if the failure was transient (retries exhausted).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Result of a batched fetch.
#[derive(Debug, Default)]
pub struct FreeBusyReport {
    /// Busy intervals per address; addresses of failed batches map to `[]`.
    pub busy: BusyMap,
    /// One message per failed batch.
    pub warnings: Vec<String>,
    pub batches: usize,
    pub failed_batches: usize,
}

impl FreeBusyReport {
    /// Returns true if at least one batch failed.
    pub fn is_partial(&self) -> bool {
        self.failed_batches > 0
    }
}

/// Wraps a [`FreeBusySource`] with batching and retries.
pub struct RetryingFetcher {
    source: Arc<dyn FreeBusySource>,
    policy: RetryPolicy,
    batch_size: usize,
    concurrency: usize,
}

impl std::fmt::Debug for RetryingFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingFetcher")
            .field("source", &self.source.name())
            .field("policy", &self.policy)
            .field("batch_size", &self.batch_size)
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl RetryingFetcher {
    pub fn new(source: Arc<dyn FreeBusySource>, policy: RetryPolicy) -> Self {
        Self {
            source,
            policy,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: 1,
        }
    }

    /// Builder: calendars per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Builder: batches in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Batch size after applying the source's own limit.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.min(self.source.max_batch_size()).max(1)
    }

    /// Fetches busy intervals for `addresses` within `window`.
    ///
    /// Fails only when every batch failed; the error is the first batch's.
    pub async fn fetch(
        &self,
        addresses: &[String],
        window: TimeWindow,
    ) -> Result<FreeBusyReport, UpstreamError> {
        if addresses.is_empty() {
            return Ok(FreeBusyReport::default());
        }

        let batches: Vec<Vec<String>> = addresses
            .chunks(self.effective_batch_size())
            .map(<[String]>::to_vec)
            .collect();
        let total = batches.len();

        let results: Vec<(usize, Vec<String>, Result<BusyMap, UpstreamError>)> =
            stream::iter(batches.into_iter().enumerate())
                .map(move |(index, batch)| async move {
                    let result = self.fetch_batch(&batch, window).await;
                    (index, batch, result)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut report = FreeBusyReport {
            batches: total,
            ..FreeBusyReport::default()
        };
        let mut first_error = None;

        for (index, batch, result) in results {
            match result {
                Ok(busy) => report.busy.extend(busy),
                Err(err) => {
                    warn!(
                        batch = index + 1,
                        batches = total,
                        calendars = batch.len(),
                        error = %err,
                        "free/busy batch failed, its rooms are reported free"
                    );
                    report
                        .warnings
                        .push(format!("batch {}/{total}: {err}", index + 1));
                    for address in batch {
                        report.busy.insert(address, Vec::new());
                    }
                    report.failed_batches += 1;
                    first_error.get_or_insert(err);
                }
            }
        }

        if report.failed_batches == total
            && let Some(err) = first_error
        {
            return Err(err);
        }

        debug!(
            calendars = addresses.len(),
            batches = total,
            failed = report.failed_batches,
            "free/busy fetch complete"
        );
        Ok(report)
    }

    /// Queries one batch, retrying transient failures.
    pub async fn fetch_batch(
        &self,
        batch: &[String],
        window: TimeWindow,
    ) -> Result<BusyMap, UpstreamError> {
        let mut retries = 0u32;
        loop {
            match self.source.query_free_busy(batch, window).await {
                Ok(busy) => return Ok(busy),
                Err(source) if !source.is_retryable() => {
                    return Err(UpstreamError::Permanent { source });
                }
                Err(source) if retries >= self.policy.max_retries() => {
                    return Err(UpstreamError::Exhausted {
                        attempts: retries + 1,
                        source,
                    });
                }
                Err(source) => {
                    retries += 1;
                    let delay = self
                        .policy
                        .delay_for(retries)
                        .max(source.retry_after().unwrap_or_default());
                    warn!(
                        retry = retries,
                        max_retries = self.policy.max_retries(),
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "transient free/busy failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
