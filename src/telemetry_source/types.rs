//! Telemetry source types

use serde::{Deserialize, Serialize};

/// One raw log line as delivered by the telemetry source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLogLine {
    /// Ingestion timestamp (epoch milliseconds)
    pub timestamp: i64,
    /// Free-text message
    pub message: String,
    /// Log stream the line was written to (one stream per execution environment)
    pub stream_id: String,
}

impl RawLogLine {
    /// Create a new log line
    pub fn new(timestamp: i64, message: impl Into<String>, stream_id: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
            stream_id: stream_id.into(),
        }
    }
}

/// Query for one page of log lines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    /// Log group to read from
    pub log_group_id: String,
    /// Range start (epoch milliseconds, inclusive)
    pub start_time: i64,
    /// Range end (epoch milliseconds, inclusive)
    pub end_time: i64,
    /// Optional source-side filter pattern
    pub filter_pattern: Option<String>,
    /// Continuation token from the previous page
    pub continuation_token: Option<String>,
}

impl LogQuery {
    /// Create a query for the first page
    pub fn new(log_group_id: impl Into<String>, start_time: i64, end_time: i64) -> Self {
        Self {
            log_group_id: log_group_id.into(),
            start_time,
            end_time,
            filter_pattern: None,
            continuation_token: None,
        }
    }

    /// Set the filter pattern
    pub fn filter_pattern(mut self, pattern: Option<String>) -> Self {
        self.filter_pattern = pattern;
        self
    }

    /// Query for the page following `token`
    pub fn with_token(&self, token: Option<String>) -> Self {
        Self {
            continuation_token: token,
            ..self.clone()
        }
    }
}

/// One page of log lines
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    /// Lines in this page
    pub lines: Vec<RawLogLine>,
    /// Token for the next page, absent on the last page
    pub next_token: Option<String>,
}

/// Statistic kind for a metric query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatisticKind {
    Average,
    Sum,
    Minimum,
    Maximum,
    SampleCount,
}

/// Metric dimension (name/value pair)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDimension {
    pub name: String,
    pub value: String,
}

impl MetricDimension {
    /// Dimension selecting a single function
    pub fn function_name(function_name: impl Into<String>) -> Self {
        Self {
            name: "FunctionName".to_string(),
            value: function_name.into(),
        }
    }
}

/// Query for a pre-aggregated metric statistic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricQuery {
    pub namespace: String,
    pub metric_name: String,
    pub statistic: StatisticKind,
    pub dimension: MetricDimension,
    pub start_time: i64,
    pub end_time: i64,
    pub period_seconds: u32,
}

/// One pre-aggregated metric datapoint
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datapoint {
    /// Period start (epoch milliseconds)
    pub timestamp: i64,
    /// Aggregated value for the period
    pub value: f64,
}

/// Configuration for the HTTP telemetry source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySourceConfig {
    /// Gateway endpoint URL
    pub endpoint: String,
    /// API key for authentication
    pub api_key: Option<String>,
    /// Request timeout in milliseconds
    pub timeout_ms: u64,
    /// Maximum attempts per page (first attempt included)
    pub max_retries: u32,
    /// Base backoff delay in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Enable response compression
    pub compression: bool,
}

impl Default for TelemetrySourceConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318".to_string(),
            api_key: None,
            timeout_ms: 30000, // 30 seconds
            max_retries: 3,
            base_retry_delay_ms: 200,
            max_retry_delay_ms: 5000,
            compression: true,
        }
    }
}

impl TelemetrySourceConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            endpoint: std::env::var("TELEMETRY_ENDPOINT").unwrap_or(defaults.endpoint),
            api_key: std::env::var("TELEMETRY_API_KEY").ok(),
            timeout_ms: std::env::var("TELEMETRY_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.timeout_ms),
            max_retries: std::env::var("TELEMETRY_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            base_retry_delay_ms: std::env::var("TELEMETRY_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.base_retry_delay_ms),
            max_retry_delay_ms: std::env::var("TELEMETRY_MAX_RETRY_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retry_delay_ms),
            compression: std::env::var("TELEMETRY_COMPRESSION")
                .map(|s| s.to_lowercase() == "true")
                .unwrap_or(defaults.compression),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }

        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err("endpoint must start with http:// or https://".to_string());
        }

        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }

        if self.max_retries == 0 {
            return Err("max_retries must be at least 1".to_string());
        }

        Ok(())
    }
}
