//! In-memory telemetry source
//!
//! Deterministic source for tests and offline replay of captured logs.

use super::{
    error::TelemetryError,
    source::TelemetrySource,
    types::{Datapoint, LogPage, LogQuery, MetricQuery, RawLogLine},
};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Telemetry source serving fixed data from memory
#[derive(Default)]
pub struct InMemoryTelemetrySource {
    logs: HashMap<String, Vec<RawLogLine>>,
    metrics: HashMap<String, Vec<Datapoint>>,
    page_size: Option<usize>,
    latency: Option<Duration>,
    denied: bool,
    /// Errors returned, in order, before any request succeeds
    scripted_failures: Mutex<VecDeque<TelemetryError>>,
    log_requests: AtomicUsize,
}

impl InMemoryTelemetrySource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add log lines to a log group
    pub fn with_log_lines(mut self, log_group_id: impl Into<String>, lines: Vec<RawLogLine>) -> Self {
        self.logs.entry(log_group_id.into()).or_default().extend(lines);
        self
    }

    /// Set datapoints served for a metric name
    pub fn with_metric(mut self, metric_name: impl Into<String>, datapoints: Vec<Datapoint>) -> Self {
        self.metrics.insert(metric_name.into(), datapoints);
        self
    }

    /// Split log results into pages of at most `page_size` lines
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size.max(1));
        self
    }

    /// Delay every response
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject every request with an access error
    pub fn denying_access(mut self) -> Self {
        self.denied = true;
        self
    }

    /// Queue an error to be returned by the next request
    pub fn with_failure(mut self, error: TelemetryError) -> Self {
        if let Ok(queue) = self.scripted_failures.get_mut() {
            queue.push_back(error);
        }
        self
    }

    /// Number of log page requests served, failures included
    pub fn log_requests(&self) -> usize {
        self.log_requests.load(Ordering::SeqCst)
    }

    async fn preflight(&self) -> Result<(), TelemetryError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        if self.denied {
            return Err(TelemetryError::AccessDenied(
                "not authorized to read telemetry".to_string(),
            ));
        }

        let scripted = self
            .scripted_failures
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        match scripted {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TelemetrySource for InMemoryTelemetrySource {
    async fn fetch_log_lines(&self, query: &LogQuery) -> Result<LogPage, TelemetryError> {
        self.log_requests.fetch_add(1, Ordering::SeqCst);
        self.preflight().await?;

        let lines = self
            .logs
            .get(&query.log_group_id)
            .ok_or_else(|| TelemetryError::NotFound(query.log_group_id.clone()))?;

        let matching: Vec<&RawLogLine> = lines
            .iter()
            .filter(|l| l.timestamp >= query.start_time && l.timestamp <= query.end_time)
            .filter(|l| match query.filter_pattern {
                Some(ref pattern) => l.message.contains(pattern.as_str()),
                None => true,
            })
            .collect();

        let offset = match query.continuation_token {
            Some(ref token) => token
                .parse::<usize>()
                .map_err(|_| TelemetryError::Service {
                    status: 400,
                    message: format!("invalid continuation token: {}", token),
                })?,
            None => 0,
        };

        let page_size = self.page_size.unwrap_or(usize::MAX);
        let end = offset.saturating_add(page_size).min(matching.len());
        let page_lines = matching
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|l| (*l).clone())
            .collect();

        Ok(LogPage {
            lines: page_lines,
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn fetch_metric_statistic(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<Datapoint>, TelemetryError> {
        self.preflight().await?;

        Ok(self
            .metrics
            .get(&query.metric_name)
            .map(|points| {
                points
                    .iter()
                    .filter(|p| p.timestamp >= query.start_time && p.timestamp <= query.end_time)
                    .copied()
                    .collect()
            })
            .unwrap_or_default())
    }
}
