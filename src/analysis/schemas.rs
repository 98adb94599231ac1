//! Cold start analysis schemas
//!
//! Data model shared by the extraction, correlation and statistics stages,
//! the analysis configuration, and the result contract returned to the
//! presentation layer.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// A typed, partial invocation fact extracted from one log line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractedFact {
    /// Runtime initialization began
    InitStart {
        /// Request id, when the line carries one
        request_id: Option<String>,
        /// Line timestamp (epoch milliseconds)
        timestamp: i64,
    },
    /// Runtime initialization finished after `duration_ms`
    InitDuration {
        /// Request id, when the line carries one
        request_id: Option<String>,
        duration_ms: f64,
    },
    /// End-of-invocation summary
    ReportSummary {
        request_id: String,
        total_duration_ms: f64,
        billed_duration_ms: Option<f64>,
        memory_allocated_mb: Option<f64>,
        memory_used_mb: Option<f64>,
        /// Present on platform REPORT lines of cold invocations
        init_duration_ms: Option<f64>,
    },
}

impl ExtractedFact {
    /// Request id carried by the fact itself
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ExtractedFact::InitStart { request_id, .. }
            | ExtractedFact::InitDuration { request_id, .. } => request_id.as_deref(),
            ExtractedFact::ReportSummary { request_id, .. } => Some(request_id),
        }
    }
}

/// Reconstructed summary of one function execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationRecord {
    /// Unique within one analysis window
    pub request_id: String,
    /// Time of the first associated fact (epoch milliseconds)
    pub timestamp: i64,
    pub is_cold_start: bool,
    pub init_duration_ms: Option<f64>,
    pub total_duration_ms: Option<f64>,
    pub billed_duration_ms: Option<f64>,
    pub memory_allocated_mb: Option<f64>,
    pub memory_used_mb: Option<f64>,
}

impl InvocationRecord {
    /// Whether a REPORT summary has been merged into the record
    pub fn is_complete(&self) -> bool {
        self.total_duration_ms.is_some()
    }
}

/// Errors for time range construction
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimeRangeError {
    #[error("Time range ends ({end}) before it starts ({start})")]
    EndBeforeStart {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("Unrecognized time range token: {0:?}")]
    UnrecognizedToken(String),
}

/// Inclusive time range of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    /// Create a range, rejecting one that ends before it starts
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        if end < start {
            return Err(TimeRangeError::EndBeforeStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range from epoch milliseconds
    pub fn from_millis(start_ms: i64, end_ms: i64) -> Result<Self, TimeRangeError> {
        let start = DateTime::from_timestamp_millis(start_ms)
            .ok_or_else(|| TimeRangeError::UnrecognizedToken(start_ms.to_string()))?;
        let end = DateTime::from_timestamp_millis(end_ms)
            .ok_or_else(|| TimeRangeError::UnrecognizedToken(end_ms.to_string()))?;
        Self::new(start, end)
    }

    /// Range ending at `now` described by a relative token
    ///
    /// Tokens are a positive count followed by a unit: `m` (minutes),
    /// `h` (hours), `d` (days) or `w` (weeks), e.g. `30m`, `24h`, `7d`.
    pub fn from_token(token: &str, now: DateTime<Utc>) -> Result<Self, TimeRangeError> {
        let unrecognized = || TimeRangeError::UnrecognizedToken(token.to_string());
        let trimmed = token.trim();

        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(unrecognized)?;
        let (count, unit) = trimmed.split_at(split);
        let count: i64 = count.parse().map_err(|_| unrecognized())?;
        if count <= 0 {
            return Err(unrecognized());
        }

        let span = match unit {
            "m" => ChronoDuration::try_minutes(count),
            "h" => ChronoDuration::try_hours(count),
            "d" => ChronoDuration::try_days(count),
            "w" => ChronoDuration::try_weeks(count),
            _ => None,
        }
        .ok_or_else(unrecognized)?;

        let start = now.checked_sub_signed(span).ok_or_else(unrecognized)?;
        Self::new(start, now)
    }

    /// Range start in epoch milliseconds
    pub fn start_millis(&self) -> i64 {
        self.start.timestamp_millis()
    }

    /// Range end in epoch milliseconds
    pub fn end_millis(&self) -> i64 {
        self.end.timestamp_millis()
    }
}

/// Scope of one analysis: a function over a time range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisWindow {
    pub function_name: String,
    pub time_range: TimeRange,
}

impl AnalysisWindow {
    /// Create a new window
    pub fn new(function_name: impl Into<String>, time_range: TimeRange) -> Self {
        Self {
            function_name: function_name.into(),
            time_range,
        }
    }
}

/// One distribution bucket of a [`StatisticalSummary`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionBucket {
    /// Human-readable range, e.g. `500-1000ms`
    pub label: String,
    /// Inclusive upper bound, `None` for the open-ended last bucket
    pub upper_bound: Option<f64>,
    pub count: u64,
}

/// Aggregate numeric summary over a sample set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticalSummary {
    pub count: u64,
    pub mean: f64,
    pub p50: f64,
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
    pub min: f64,
    pub max: f64,
    /// Population variance
    pub variance: f64,
    pub std_dev: f64,
    /// Ordered from the lowest bucket to the open-ended one
    pub distribution_buckets: Vec<DistributionBucket>,
}

/// Cold start frequency class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrequencyClass {
    VeryLow,
    Low,
    Moderate,
    High,
    VeryHigh,
    /// No invocations observed
    None,
}

impl fmt::Display for FrequencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrequencyClass::VeryLow => "Very Low",
            FrequencyClass::Low => "Low",
            FrequencyClass::Moderate => "Moderate",
            FrequencyClass::High => "High",
            FrequencyClass::VeryHigh => "Very High",
            FrequencyClass::None => "No data",
        };
        f.write_str(label)
    }
}

/// Heuristically inferred cause of cold starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Trigger {
    #[serde(rename = "long idle periods")]
    LongIdlePeriods,
    #[serde(rename = "moderate idle periods")]
    ModerateIdlePeriods,
    #[serde(rename = "deployment/update")]
    DeploymentUpdate,
    #[serde(rename = "scaling events")]
    ScalingEvents,
    #[serde(rename = "normal lifecycle")]
    NormalLifecycle,
}

impl Trigger {
    /// Label as reported in results
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::LongIdlePeriods => "long idle periods",
            Trigger::ModerateIdlePeriods => "moderate idle periods",
            Trigger::DeploymentUpdate => "deployment/update",
            Trigger::ScalingEvents => "scaling events",
            Trigger::NormalLifecycle => "normal lifecycle",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Inter-invocation gap statistics (milliseconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GapAnalysis {
    pub gap_count: u64,
    pub average_gap_ms: f64,
    pub median_gap_ms: f64,
    pub min_gap_ms: f64,
    pub max_gap_ms: f64,
}

/// Temporal pattern of cold starts within a window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternResult {
    /// Top hours as `HH:00` labels, busiest first
    pub peak_hours: Vec<String>,
    /// Cold start count per local hour of day
    pub hourly_distribution: [u64; 24],
    pub frequency_class: FrequencyClass,
    /// Cold starts per 100 invocations, within `[0, 100]`
    pub cold_start_rate: f64,
    pub triggers: BTreeSet<Trigger>,
    pub clustering_detected: bool,
    /// Absent with fewer than two invocations
    pub gap_analysis: Option<GapAnalysis>,
}

impl PatternResult {
    /// Pattern for a window without invocations
    pub fn empty() -> Self {
        Self {
            peak_hours: Vec::new(),
            hourly_distribution: [0; 24],
            frequency_class: FrequencyClass::None,
            cold_start_rate: 0.0,
            triggers: BTreeSet::from([Trigger::NormalLifecycle]),
            clustering_detected: false,
            gap_analysis: None,
        }
    }
}

/// Cold start section of the analysis result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartSummary {
    pub total: u64,
    /// Percentage of invocations that were cold starts
    pub rate: f64,
    /// Init duration statistics over cold starts with a known init duration
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    pub min_duration_ms: f64,
    pub init_duration_stats: StatisticalSummary,
}

/// Scalars derived from pre-aggregated metrics (mean across datapoints)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricSummary {
    pub avg_duration_ms: Option<f64>,
    pub invocations: Option<f64>,
    pub errors: Option<f64>,
    pub throttles: Option<f64>,
}

/// Bookkeeping from the correlation stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelationStats {
    pub lines_scanned: u64,
    pub facts_extracted: u64,
    pub records: u64,
    pub complete_records: u64,
    /// INIT_START lines that could not be bound to any request id
    pub unresolved_init_starts: u64,
    /// INIT_DURATION lines with no resolvable request id
    pub orphan_init_durations: u64,
}

/// How an analysis concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStatus {
    Complete,
    TelemetryUnavailable,
    TimedOut,
}

/// Result of one cold start analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColdStartAnalysis {
    pub analysis_id: Uuid,
    pub function_name: String,
    pub time_range: TimeRange,
    pub status: AnalysisStatus,
    pub total_invocations: u64,
    pub cold_starts: ColdStartSummary,
    pub duration_stats: StatisticalSummary,
    pub memory_stats: StatisticalSummary,
    pub pattern: PatternResult,
    pub metric_summary: MetricSummary,
    pub correlation: CorrelationStats,
    /// Produced by the recommendation generator, passed through unchanged
    pub recommendations: Vec<String>,
}

/// Configuration for cold start analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Association horizon after an INIT_START (milliseconds)
    pub correlation_window_ms: u64,

    /// Maximum distance between consecutive cold starts counted as clustered
    pub clustering_gap_ms: u64,

    /// Fraction of clustered cold starts above which a deployment is inferred
    pub clustering_ratio: f64,

    /// Cold start count above which scaling is inferred
    pub scaling_cold_start_threshold: u64,

    /// Average gap above which idle periods are long (milliseconds)
    pub long_idle_gap_ms: u64,

    /// Average gap above which idle periods are moderate (milliseconds)
    pub moderate_idle_gap_ms: u64,

    /// Number of peak hours reported
    pub peak_hour_count: usize,

    /// Offset of the local time zone used for hour-of-day bucketing
    pub utc_offset_minutes: i32,

    /// Prefix joined with the function name to form the log group id
    pub log_group_prefix: String,

    /// Optional source-side filter pattern for log lines
    pub log_filter_pattern: Option<String>,

    /// Namespace of the platform metrics
    pub metric_namespace: String,

    /// Aggregation period of metric datapoints (seconds)
    pub metric_period_seconds: u32,

    /// Upper bound on fetching and analyzing one window (milliseconds)
    pub fetch_timeout_ms: u64,

    /// Maximum analyses running at once in [`analyze_many`](crate::analysis::AnalysisCoordinator::analyze_many)
    pub max_concurrency: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            correlation_window_ms: 30_000,
            clustering_gap_ms: 60_000,
            clustering_ratio: 0.30,
            scaling_cold_start_threshold: 10,
            long_idle_gap_ms: 15 * 60 * 1000,
            moderate_idle_gap_ms: 5 * 60 * 1000,
            peak_hour_count: 3,
            utc_offset_minutes: 0,
            log_group_prefix: "/aws/lambda/".to_string(),
            log_filter_pattern: None,
            metric_namespace: "AWS/Lambda".to_string(),
            metric_period_seconds: 300,
            fetch_timeout_ms: 60_000,
            max_concurrency: 4,
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

impl AnalysisConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            correlation_window_ms: env_parsed("LENS_CORRELATION_WINDOW_MS")
                .unwrap_or(defaults.correlation_window_ms),
            clustering_gap_ms: env_parsed("LENS_CLUSTERING_GAP_MS")
                .unwrap_or(defaults.clustering_gap_ms),
            clustering_ratio: env_parsed("LENS_CLUSTERING_RATIO")
                .unwrap_or(defaults.clustering_ratio),
            scaling_cold_start_threshold: env_parsed("LENS_SCALING_THRESHOLD")
                .unwrap_or(defaults.scaling_cold_start_threshold),
            long_idle_gap_ms: env_parsed("LENS_LONG_IDLE_GAP_MS")
                .unwrap_or(defaults.long_idle_gap_ms),
            moderate_idle_gap_ms: env_parsed("LENS_MODERATE_IDLE_GAP_MS")
                .unwrap_or(defaults.moderate_idle_gap_ms),
            peak_hour_count: env_parsed("LENS_PEAK_HOURS").unwrap_or(defaults.peak_hour_count),
            utc_offset_minutes: env_parsed("LENS_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.utc_offset_minutes),
            log_group_prefix: std::env::var("LENS_LOG_GROUP_PREFIX")
                .unwrap_or(defaults.log_group_prefix),
            log_filter_pattern: std::env::var("LENS_LOG_FILTER_PATTERN").ok(),
            metric_namespace: std::env::var("LENS_METRIC_NAMESPACE")
                .unwrap_or(defaults.metric_namespace),
            metric_period_seconds: env_parsed("LENS_METRIC_PERIOD_SECONDS")
                .unwrap_or(defaults.metric_period_seconds),
            fetch_timeout_ms: env_parsed("LENS_FETCH_TIMEOUT_MS")
                .unwrap_or(defaults.fetch_timeout_ms),
            max_concurrency: env_parsed("LENS_MAX_CONCURRENCY")
                .unwrap_or(defaults.max_concurrency),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.correlation_window_ms == 0 {
            return Err("correlation_window_ms must be greater than 0".to_string());
        }

        if !(0.0..=1.0).contains(&self.clustering_ratio) {
            return Err("clustering_ratio must be within [0, 1]".to_string());
        }

        if self.moderate_idle_gap_ms > self.long_idle_gap_ms {
            return Err("moderate_idle_gap_ms must not exceed long_idle_gap_ms".to_string());
        }

        if self.utc_offset_minutes.unsigned_abs() >= 24 * 60 {
            return Err("utc_offset_minutes must be within one day".to_string());
        }

        if self.metric_period_seconds == 0 {
            return Err("metric_period_seconds must be greater than 0".to_string());
        }

        if self.fetch_timeout_ms == 0 {
            return Err("fetch_timeout_ms must be greater than 0".to_string());
        }

        if self.max_concurrency == 0 {
            return Err("max_concurrency must be at least 1".to_string());
        }

        Ok(())
    }

    /// Log group id for a function
    pub fn log_group_for(&self, function_name: &str) -> String {
        format!("{}{}", self.log_group_prefix, function_name)
    }
}
