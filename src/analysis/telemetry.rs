//! Telemetry emission for cold start analysis
//!
//! One OpenTelemetry span and one structured log event per completed
//! analysis.

use opentelemetry::trace::{Span, SpanKind, Tracer};
use opentelemetry::{global, KeyValue};
use tracing::{debug, info, instrument};

use super::schemas::ColdStartAnalysis;

/// Log target of analysis summaries
pub const LOG_TARGET: &str = "serverless_lens";

/// Analysis telemetry emitter
#[derive(Debug, Clone)]
pub struct AnalysisTelemetry {
    tracer_name: String,
}

impl AnalysisTelemetry {
    /// Create a new telemetry emitter
    pub fn new(tracer_name: impl Into<String>) -> Self {
        Self {
            tracer_name: tracer_name.into(),
        }
    }

    /// Emit span and summary event for a finished analysis
    #[instrument(skip(self, analysis), fields(function = %analysis.function_name))]
    pub fn emit_analysis_span(&self, analysis: &ColdStartAnalysis, elapsed_ms: u64) {
        let tracer = global::tracer(self.tracer_name.clone());

        let mut span = tracer
            .span_builder("cold_start_analysis")
            .with_kind(SpanKind::Internal)
            .start(&tracer);

        span.set_attribute(KeyValue::new("analysis.id", analysis.analysis_id.to_string()));
        span.set_attribute(KeyValue::new(
            "function.name",
            analysis.function_name.clone(),
        ));
        span.set_attribute(KeyValue::new(
            "analysis.status",
            format!("{:?}", analysis.status),
        ));
        span.set_attribute(KeyValue::new("analysis.duration_ms", elapsed_ms as i64));
        span.set_attribute(KeyValue::new(
            "output.total_invocations",
            analysis.total_invocations as i64,
        ));
        span.set_attribute(KeyValue::new(
            "output.cold_starts",
            analysis.cold_starts.total as i64,
        ));
        span.set_attribute(KeyValue::new(
            "output.cold_start_rate",
            analysis.cold_starts.rate,
        ));
        span.set_attribute(KeyValue::new(
            "output.frequency_class",
            analysis.pattern.frequency_class.to_string(),
        ));
        span.set_attribute(KeyValue::new(
            "duration.p50_ms",
            analysis.duration_stats.p50,
        ));
        span.set_attribute(KeyValue::new(
            "duration.p99_ms",
            analysis.duration_stats.p99,
        ));
        span.set_attribute(KeyValue::new(
            "correlation.unresolved_init_starts",
            analysis.correlation.unresolved_init_starts as i64,
        ));

        span.end();

        let triggers: Vec<&str> = analysis.pattern.triggers.iter().map(|t| t.label()).collect();
        info!(
            target: LOG_TARGET,
            analysis_id = %analysis.analysis_id,
            function = %analysis.function_name,
            status = ?analysis.status,
            invocations = analysis.total_invocations,
            cold_starts = analysis.cold_starts.total,
            rate = analysis.cold_starts.rate,
            frequency = %analysis.pattern.frequency_class,
            triggers = ?triggers,
            elapsed_ms,
            "Cold start analysis completed"
        );
    }

    /// Log statistics of the analysis at debug level
    pub fn emit_metrics(&self, analysis: &ColdStartAnalysis) {
        debug!(
            duration_p50_ms = analysis.duration_stats.p50,
            duration_p95_ms = analysis.duration_stats.p95,
            duration_p99_ms = analysis.duration_stats.p99,
            init_avg_ms = analysis.cold_starts.avg_duration_ms,
            memory_p95_mb = analysis.memory_stats.p95,
            peak_hours = ?analysis.pattern.peak_hours,
            "Cold start analysis metrics"
        );
    }
}

impl Default for AnalysisTelemetry {
    fn default() -> Self {
        Self::new("serverless-latency-lens")
    }
}
