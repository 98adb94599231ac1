//! Analysis Coordinator
//!
//! Entry point of the crate. For one function and time range it:
//! 1. Validates the window
//! 2. Fetches every log page and the platform metric statistics
//! 3. Extracts facts and correlates them into invocation records
//! 4. Classifies cold starts and computes statistics and patterns
//! 5. Asks the recommendation generator for advice
//! 6. Returns one immutable [`ColdStartAnalysis`]
//!
//! Telemetry failures never reach the caller: they produce the empty
//! result with a status explaining why.

use super::classifier::ColdStartClassifier;
use super::correlator::InvocationCorrelator;
use super::patterns::TemporalPatternDetector;
use super::recommendations::{NoRecommendations, RecommendationGenerator};
use super::schemas::*;
use super::statistics::StatisticsEngine;
use super::telemetry::AnalysisTelemetry;
use crate::telemetry_source::{
    fetch_all_log_lines, fetch_metric_average, LogQuery, MetricDimension, MetricQuery, RawLogLine,
    RetryPolicy, StatisticKind, TelemetryResult, TelemetrySource,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Errors raised to the caller of an analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(#[from] TimeRangeError),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Analysis task failed: {0}")]
    TaskFailed(String),
}

/// Result type for analysis operations
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Raw telemetry gathered for one window
struct FetchedTelemetry {
    lines: Vec<RawLogLine>,
    metrics: MetricSummary,
}

/// Orchestrates fetching, correlation and aggregation
///
/// Cloning is cheap; clones share the telemetry source and generator.
#[derive(Clone)]
pub struct AnalysisCoordinator {
    source: Arc<dyn TelemetrySource>,
    recommender: Arc<dyn RecommendationGenerator>,
    config: Arc<AnalysisConfig>,
    retry_policy: RetryPolicy,
    correlator: InvocationCorrelator,
    classifier: ColdStartClassifier,
    durations: StatisticsEngine,
    memory: StatisticsEngine,
    patterns: TemporalPatternDetector,
    telemetry: Option<AnalysisTelemetry>,
}

impl AnalysisCoordinator {
    /// Create a coordinator over a telemetry source
    pub fn new(source: Arc<dyn TelemetrySource>, config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate().map_err(AnalysisError::InvalidConfig)?;

        Ok(Self {
            source,
            recommender: Arc::new(NoRecommendations),
            retry_policy: RetryPolicy::default(),
            correlator: InvocationCorrelator::from_config(&config),
            classifier: ColdStartClassifier::new(),
            durations: StatisticsEngine::for_durations(),
            memory: StatisticsEngine::for_memory(),
            patterns: TemporalPatternDetector::new(&config),
            telemetry: Some(AnalysisTelemetry::default()),
            config: Arc::new(config),
        })
    }

    /// Set the recommendation generator
    pub fn with_recommendations(mut self, recommender: Arc<dyn RecommendationGenerator>) -> Self {
        self.recommender = recommender;
        self
    }

    /// Set the retry policy for telemetry requests
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Disable span and summary emission
    pub fn without_telemetry(mut self) -> Self {
        self.telemetry = None;
        self
    }

    /// Analysis configuration in use
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze a function over a relative range ending at `now`
    pub async fn analyze_range(
        &self,
        function_name: &str,
        range_token: &str,
        now: DateTime<Utc>,
    ) -> AnalysisResult<ColdStartAnalysis> {
        let time_range = TimeRange::from_token(range_token, now)?;
        self.analyze(&AnalysisWindow::new(function_name, time_range)).await
    }

    /// Analyze one window
    ///
    /// Only an invalid time range is an error. Unavailable or slow telemetry
    /// yields the empty result with [`AnalysisStatus::TelemetryUnavailable`]
    /// or [`AnalysisStatus::TimedOut`].
    #[instrument(skip(self, window), fields(function = %window.function_name))]
    pub async fn analyze(&self, window: &AnalysisWindow) -> AnalysisResult<ColdStartAnalysis> {
        let started = Instant::now();
        let range = window.time_range;
        TimeRange::new(range.start, range.end)?;

        let analysis_id = Uuid::new_v4();
        info!(
            %analysis_id,
            start = %range.start,
            end = %range.end,
            "Starting cold start analysis"
        );

        let timeout = Duration::from_millis(self.config.fetch_timeout_ms);
        let analysis = match tokio::time::timeout(timeout, self.fetch(window)).await {
            Ok(Ok(fetched)) => self.build(analysis_id, window, fetched),
            Ok(Err(e)) => {
                warn!(error = %e, "Telemetry unavailable, returning empty analysis");
                self.empty_result(
                    analysis_id,
                    window,
                    AnalysisStatus::TelemetryUnavailable,
                    format!(
                        "Unable to access telemetry for function '{}': {}. Check that the caller may read its logs and metrics.",
                        window.function_name, e
                    ),
                )
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.fetch_timeout_ms,
                    "Telemetry fetch timed out, returning empty analysis"
                );
                self.empty_result(
                    analysis_id,
                    window,
                    AnalysisStatus::TimedOut,
                    format!(
                        "Telemetry fetch for function '{}' timed out after {} ms; no invocations were analyzed.",
                        window.function_name, self.config.fetch_timeout_ms
                    ),
                )
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if let Some(ref telemetry) = self.telemetry {
            telemetry.emit_analysis_span(&analysis, elapsed_ms);
            telemetry.emit_metrics(&analysis);
        }

        Ok(analysis)
    }

    /// Run one analysis on its own task
    ///
    /// Aborting the returned handle cancels only this analysis.
    pub fn spawn(&self, window: AnalysisWindow) -> JoinHandle<AnalysisResult<ColdStartAnalysis>> {
        let coordinator = self.clone();
        tokio::spawn(async move { coordinator.analyze(&window).await })
    }

    /// Analyze several windows concurrently
    ///
    /// At most `max_concurrency` analyses run at once. Results are returned
    /// in the order of `windows`.
    pub async fn analyze_many(
        &self,
        windows: Vec<AnalysisWindow>,
    ) -> Vec<AnalysisResult<ColdStartAnalysis>> {
        debug!(
            windows = windows.len(),
            max_concurrency = self.config.max_concurrency,
            "Analyzing windows concurrently"
        );

        stream::iter(windows)
            .map(|window| self.spawn(window))
            .buffered(self.config.max_concurrency)
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) => Err(AnalysisError::TaskFailed(e.to_string())),
            })
            .collect()
            .await
    }

    async fn fetch(&self, window: &AnalysisWindow) -> TelemetryResult<FetchedTelemetry> {
        let range = &window.time_range;
        let query = LogQuery::new(
            self.config.log_group_for(&window.function_name),
            range.start_millis(),
            range.end_millis(),
        )
        .filter_pattern(self.config.log_filter_pattern.clone());

        let lines = fetch_all_log_lines(self.source.as_ref(), &query, &self.retry_policy).await?;

        let (avg_duration_ms, invocations, errors, throttles) = futures::try_join!(
            self.metric_average(window, "Duration", StatisticKind::Average),
            self.metric_average(window, "Invocations", StatisticKind::Sum),
            self.metric_average(window, "Errors", StatisticKind::Sum),
            self.metric_average(window, "Throttles", StatisticKind::Sum),
        )?;

        Ok(FetchedTelemetry {
            lines,
            metrics: MetricSummary {
                avg_duration_ms,
                invocations,
                errors,
                throttles,
            },
        })
    }

    async fn metric_average(
        &self,
        window: &AnalysisWindow,
        metric_name: &str,
        statistic: StatisticKind,
    ) -> TelemetryResult<Option<f64>> {
        let query = MetricQuery {
            namespace: self.config.metric_namespace.clone(),
            metric_name: metric_name.to_string(),
            statistic,
            dimension: MetricDimension::function_name(window.function_name.clone()),
            start_time: window.time_range.start_millis(),
            end_time: window.time_range.end_millis(),
            period_seconds: self.config.metric_period_seconds,
        };
        fetch_metric_average(self.source.as_ref(), &query, &self.retry_policy).await
    }

    fn build(
        &self,
        analysis_id: Uuid,
        window: &AnalysisWindow,
        fetched: FetchedTelemetry,
    ) -> ColdStartAnalysis {
        let correlation = self.correlator.correlate(&fetched.lines);
        let records = &correlation.records;
        let classification = self.classifier.partition(records);
        debug!(
            function = %window.function_name,
            cold = classification.cold.len(),
            warm = classification.warm.len(),
            unresolved_init_starts = correlation.stats.unresolved_init_starts,
            "Classified invocations"
        );

        let durations: Vec<f64> = records.iter().filter_map(|r| r.total_duration_ms).collect();
        let memory_used: Vec<f64> = records.iter().filter_map(|r| r.memory_used_mb).collect();
        let init_durations: Vec<f64> = classification
            .cold
            .iter()
            .filter_map(|r| r.init_duration_ms)
            .collect();
        let invocation_timestamps: Vec<i64> = records.iter().map(|r| r.timestamp).collect();

        let pattern = self
            .patterns
            .detect(&classification.cold_start_timestamps(), &invocation_timestamps);
        let init_duration_stats = self.durations.summarize(&init_durations);

        let mut analysis = ColdStartAnalysis {
            analysis_id,
            function_name: window.function_name.clone(),
            time_range: window.time_range,
            status: AnalysisStatus::Complete,
            total_invocations: records.len() as u64,
            cold_starts: ColdStartSummary {
                total: classification.cold.len() as u64,
                rate: pattern.cold_start_rate,
                avg_duration_ms: init_duration_stats.mean,
                max_duration_ms: init_duration_stats.max,
                min_duration_ms: init_duration_stats.min,
                init_duration_stats,
            },
            duration_stats: self.durations.summarize(&durations),
            memory_stats: self.memory.summarize(&memory_used),
            pattern,
            metric_summary: fetched.metrics,
            correlation: correlation.stats,
            recommendations: Vec::new(),
        };
        analysis.recommendations = self.recommender.recommend(&analysis);

        info!(
            %analysis_id,
            invocations = analysis.total_invocations,
            cold_starts = analysis.cold_starts.total,
            "Cold start analysis complete"
        );
        analysis
    }

    fn empty_result(
        &self,
        analysis_id: Uuid,
        window: &AnalysisWindow,
        status: AnalysisStatus,
        note: String,
    ) -> ColdStartAnalysis {
        ColdStartAnalysis {
            analysis_id,
            function_name: window.function_name.clone(),
            time_range: window.time_range,
            status,
            total_invocations: 0,
            cold_starts: ColdStartSummary {
                total: 0,
                rate: 0.0,
                avg_duration_ms: 0.0,
                max_duration_ms: 0.0,
                min_duration_ms: 0.0,
                init_duration_stats: self.durations.empty(),
            },
            duration_stats: self.durations.empty(),
            memory_stats: self.memory.empty(),
            pattern: PatternResult::empty(),
            metric_summary: MetricSummary::default(),
            correlation: CorrelationStats::default(),
            recommendations: vec![note],
        }
    }
}
