//! Telemetry source capability and paginated fetch helpers

use super::error::TelemetryError;
use super::types::{Datapoint, LogPage, LogQuery, MetricQuery, RawLogLine, TelemetrySourceConfig};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Capability for reading log lines and metric statistics
///
/// Injected into the [`AnalysisCoordinator`](crate::analysis::AnalysisCoordinator);
/// implementations must be safe to share between concurrent analyses.
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Fetch one page of log lines
    async fn fetch_log_lines(&self, query: &LogQuery) -> Result<LogPage, TelemetryError>;

    /// Fetch pre-aggregated datapoints for one metric statistic
    async fn fetch_metric_statistic(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<Datapoint>, TelemetryError>;
}

/// Backoff policy for retryable telemetry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum attempts per request (first attempt included)
    pub max_attempts: u32,
    /// Base delay, doubled on each further attempt
    pub base_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&TelemetrySourceConfig::default())
    }
}

impl From<&TelemetrySourceConfig> for RetryPolicy {
    fn from(config: &TelemetrySourceConfig) -> Self {
        Self {
            max_attempts: config.max_retries.max(1),
            base_delay: Duration::from_millis(config.base_retry_delay_ms),
            max_delay: Duration::from_millis(config.max_retry_delay_ms),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before the attempt following `attempt` (1-based)
    ///
    /// A server-provided hint wins over the exponential schedule when larger.
    pub fn delay_for(&self, attempt: u32, error: &TelemetryError) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let exponential = self.base_delay.saturating_mul(1u32 << shift);
        let hinted = error
            .retry_delay_ms()
            .map(Duration::from_millis)
            .unwrap_or(Duration::ZERO);
        exponential.max(hinted).min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are exhausted
async fn with_retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, TelemetryError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, TelemetryError>>,
{
    let mut attempts = 0;
    loop {
        attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempts < policy.max_attempts => {
                let delay = policy.delay_for(attempts, &e);
                warn!(
                    error = %e,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    retry_delay_ms = delay.as_millis() as u64,
                    "Retrying {}",
                    what
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                error!(error = %e, attempts, "Failed to {}", what);
                return Err(e);
            }
        }
    }
}

/// Fetch every page of log lines for `query`
///
/// Pages are requested sequentially. A retried request reuses the same
/// continuation token, so a page is ingested at most once.
pub async fn fetch_all_log_lines(
    source: &dyn TelemetrySource,
    query: &LogQuery,
    policy: &RetryPolicy,
) -> Result<Vec<RawLogLine>, TelemetryError> {
    let mut lines = Vec::new();
    let mut token = query.continuation_token.clone();
    let mut pages = 0u32;

    loop {
        let page_query = query.with_token(token.clone());
        let page = with_retry(policy, "fetch log page", || source.fetch_log_lines(&page_query)).await?;
        pages += 1;

        trace_page(&query.log_group_id, pages, &page);
        lines.extend(page.lines);

        match page.next_token {
            // A source echoing the same token would loop forever
            Some(next) if token.as_deref() == Some(next.as_str()) => {
                warn!(log_group = %query.log_group_id, token = %next, "Source repeated continuation token, stopping");
                break;
            }
            Some(next) => token = Some(next),
            None => break,
        }
    }

    debug!(
        log_group = %query.log_group_id,
        pages,
        lines = lines.len(),
        "Fetched log lines"
    );
    Ok(lines)
}

fn trace_page(log_group: &str, page_number: u32, page: &LogPage) {
    tracing::trace!(
        log_group,
        page = page_number,
        lines = page.lines.len(),
        has_more = page.next_token.is_some(),
        "Log page received"
    );
}

/// Fetch one metric statistic and average it across the returned datapoints
///
/// Returns `None` when the source has no datapoints for the range.
pub async fn fetch_metric_average(
    source: &dyn TelemetrySource,
    query: &MetricQuery,
    policy: &RetryPolicy,
) -> Result<Option<f64>, TelemetryError> {
    let datapoints = with_retry(policy, "fetch metric statistic", || {
        source.fetch_metric_statistic(query)
    })
    .await?;

    Ok(average_datapoints(&datapoints))
}

/// Mean of the datapoint values, ignoring non-finite values
pub fn average_datapoints(datapoints: &[Datapoint]) -> Option<f64> {
    let values: Vec<f64> = datapoints
        .iter()
        .map(|d| d.value)
        .filter(|v| v.is_finite())
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
