//! Cold start analysis
//!
//! Reconstructs per-invocation records from free-text function logs and
//! derives cold start diagnostics for one function over one time range.
//!
//! ```text
//!  TelemetrySource ──► RawLogLine ──► EventExtractor ──► ExtractedFact
//!                                                            │
//!                                                            ▼
//!                                                 InvocationCorrelator
//!                                                            │
//!                                                   InvocationRecord[]
//!                            ┌───────────────────────────────┼──────────────────────────┐
//!                            ▼                               ▼                          ▼
//!                  ColdStartClassifier              StatisticsEngine        TemporalPatternDetector
//!                            └───────────────────────────────┼──────────────────────────┘
//!                                                            ▼
//!                                                AnalysisCoordinator ──► ColdStartAnalysis
//! ```
//!
//! # Scope
//!
//! - Detect cold starts from INIT_START lines
//! - Summarize durations, memory usage and init durations
//! - Classify cold start frequency and infer likely triggers
//!
//! The analysis only observes. It never changes function configuration or
//! warms environments.

mod classifier;
mod coordinator;
mod correlator;
mod extractor;
mod patterns;
mod recommendations;
mod schemas;
mod statistics;
mod telemetry;

pub use classifier::{Classification, ColdStartClassifier};
pub use coordinator::{AnalysisCoordinator, AnalysisError, AnalysisResult};
pub use correlator::{
    Correlation, InvocationCorrelator, InvocationEvidence, DEFAULT_CORRELATION_WINDOW_MS,
};
pub use extractor::{EventExtractor, INIT_START_MARKER, REPORT_MARKER};
pub use patterns::{cold_start_rate, frequency_class, gap_analysis, peak_hours, TemporalPatternDetector};
pub use recommendations::{NoRecommendations, RecommendationGenerator};
pub use schemas::*;
pub use statistics::{percentile, BucketScheme, StatisticsEngine};
pub use telemetry::{AnalysisTelemetry, LOG_TARGET};
