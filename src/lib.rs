//! Serverless Latency Lens
//!
//! Cold start detection and invocation latency analytics for serverless
//! function telemetry.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    AnalysisCoordinator                       │
//! │        (one window = one function over one time range)       │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Telemetry Source                          │
//! │  ┌─────────────────────┐        ┌─────────────────────────┐  │
//! │  │ HttpTelemetrySource │        │ InMemoryTelemetrySource │  │
//! │  │  (log/metrics API)  │        │    (tests, replay)      │  │
//! │  └─────────────────────┘        └─────────────────────────┘  │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │   extract → correlate → classify → statistics / patterns     │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                           ▼
//!                   ColdStartAnalysis
//! ```
//!
//! # Modules
//!
//! - [`analysis`]: extraction, correlation, classification and aggregation
//! - [`telemetry_source`]: log and metric retrieval with pagination and retries
//!
//! # Example
//!
//! ```no_run
//! use serverless_latency_lens::analysis::{AnalysisConfig, AnalysisCoordinator};
//! use serverless_latency_lens::telemetry_source::HttpTelemetrySource;
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let source = HttpTelemetrySource::from_env()?;
//! let coordinator = AnalysisCoordinator::new(Arc::new(source), AnalysisConfig::from_env())?;
//!
//! let analysis = coordinator
//!     .analyze_range("checkout", "24h", chrono::Utc::now())
//!     .await?;
//! println!("{} cold starts", analysis.cold_starts.total);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod telemetry_source;

pub use analysis::{AnalysisConfig, AnalysisCoordinator, AnalysisError, ColdStartAnalysis};
pub use telemetry_source::{TelemetryError, TelemetrySource};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
