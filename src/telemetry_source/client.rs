//! HTTP Telemetry Source
//!
//! Async JSON client for a log/metrics gateway. Retries are left to the
//! paginated fetch helpers so that a page is never requested twice after
//! it has been accepted.

use super::{
    error::TelemetryError,
    source::TelemetrySource,
    types::{Datapoint, LogPage, LogQuery, MetricQuery, TelemetrySourceConfig},
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use tracing::debug;

/// Telemetry source backed by an HTTP gateway
pub struct HttpTelemetrySource {
    /// HTTP client
    client: Client,
    /// Configuration
    config: TelemetrySourceConfig,
}

#[derive(Debug, Deserialize)]
struct MetricResponse {
    datapoints: Vec<Datapoint>,
}

impl HttpTelemetrySource {
    /// Create a new source with configuration
    pub fn new(config: TelemetrySourceConfig) -> Result<Self, TelemetryError> {
        config.validate().map_err(TelemetryError::InvalidConfig)?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .gzip(config.compression)
            .build()?;

        Ok(Self { client, config })
    }

    /// Create source from environment variables
    pub fn from_env() -> Result<Self, TelemetryError> {
        Self::new(TelemetrySourceConfig::from_env())
    }

    /// Get configuration
    pub fn config(&self) -> &TelemetrySourceConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.api_key {
            Some(ref api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TelemetryError> {
        let response = self.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() {
                TelemetryError::Timeout(self.config.timeout_ms)
            } else {
                TelemetryError::Network(e)
            }
        })?;

        let status = response.status().as_u16();
        match status {
            200..=299 => Ok(response),
            429 => {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(|secs| secs.saturating_mul(1000))
                    .unwrap_or(1000);

                Err(TelemetryError::Throttled {
                    retry_after_ms: retry_after,
                })
            }
            401 | 403 => Err(TelemetryError::AccessDenied(
                response.text().await.unwrap_or_default(),
            )),
            404 => Err(TelemetryError::NotFound(
                response.text().await.unwrap_or_default(),
            )),
            _ => Err(TelemetryError::Service {
                status,
                message: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

/// Read the whole body, then decode it
///
/// A malformed body surfaces as [`TelemetryError::Serialization`] rather
/// than a network error.
async fn decode_body<T: DeserializeOwned>(response: Response) -> Result<T, TelemetryError> {
    let bytes = response.bytes().await?;
    decode(&bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TelemetryError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl TelemetrySource for HttpTelemetrySource {
    async fn fetch_log_lines(&self, query: &LogQuery) -> Result<LogPage, TelemetryError> {
        let url = format!("{}/v1/logs/query", self.config.endpoint);
        let response = self.send(self.client.post(&url).json(query)).await?;
        let page: LogPage = decode_body(response).await?;

        debug!(
            log_group = %query.log_group_id,
            lines = page.lines.len(),
            has_more = page.next_token.is_some(),
            "Log page fetched"
        );
        Ok(page)
    }

    async fn fetch_metric_statistic(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<Datapoint>, TelemetryError> {
        let url = format!("{}/v1/metrics/statistic", self.config.endpoint);
        let response = self.send(self.client.post(&url).json(query)).await?;
        let body: MetricResponse = decode_body(response).await?;

        debug!(
            metric = %query.metric_name,
            datapoints = body.datapoints.len(),
            "Metric statistic fetched"
        );
        Ok(body.datapoints)
    }
}

impl Clone for HttpTelemetrySource {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            config: self.config.clone(),
        }
    }
}
