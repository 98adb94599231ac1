//! Telemetry Source
//!
//! Capability interface for the external log/metrics API that supplies raw
//! invocation telemetry, plus the implementations shipped with the crate.
//!
//! ```text
//! AnalysisCoordinator ──► TelemetrySource ──► HttpTelemetrySource ──► log/metrics gateway
//!                                        └──► InMemoryTelemetrySource (tests, replay)
//! ```
//!
//! Log lines are paginated: [`fetch_all_log_lines`] walks continuation tokens
//! sequentially and retries throttled or transient failures with backoff,
//! re-requesting the same token so that no page is ingested twice.

mod client;
mod error;
mod memory;
mod source;
mod types;

pub use client::HttpTelemetrySource;
pub use error::{TelemetryError, TelemetryResult};
pub use memory::InMemoryTelemetrySource;
pub use source::{
    average_datapoints, fetch_all_log_lines, fetch_metric_average, RetryPolicy, TelemetrySource,
};
pub use types::*;
